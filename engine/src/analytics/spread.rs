//! Cross-market spread with a direction-compatibility guard.

use crate::analytics::round_to;

/// Two prices more than this ratio apart denominate different things
/// (e.g. USDC-per-WETH vs WETH-per-UNI); comparing them yields nonsense.
pub const DIRECTION_RATIO_LIMIT: f64 = 100.0;

/// Spread between two markets, or the reason it is unavailable.
/// `percent` and `reason` are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpreadState {
    pub percent: Option<f64>,
    pub reason: Option<String>,
}

impl SpreadState {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            percent: None,
            reason: Some(reason.into()),
        }
    }
}

/// Relative gap `(a - b) / b * 100` between the freshest price of each
/// market. Missing inputs and direction-incompatible pairs produce a
/// reason instead of a number.
pub fn cross_market_spread(
    price_a: Option<f64>,
    price_b: Option<f64>,
    cap_percent: f64,
) -> SpreadState {
    let (a, b) = match (price_a, price_b) {
        (None, None) => return SpreadState::unavailable("no recent prices for either market"),
        (None, Some(_)) => return SpreadState::unavailable("no recent price for market A"),
        (Some(_), None) => return SpreadState::unavailable("no recent price for market B"),
        (Some(a), Some(b)) => (a, b),
    };

    if !a.is_finite() || !b.is_finite() || a <= 0.0 || b <= 0.0 {
        return SpreadState::unavailable("non-positive price observed");
    }

    let ratio = a.max(b) / a.min(b);
    if ratio >= DIRECTION_RATIO_LIMIT {
        return SpreadState::unavailable(format!(
            "direction-incompatible prices (ratio {ratio:.0}x)"
        ));
    }

    let spread = (a - b) / b * 100.0;
    if !spread.is_finite() || spread.abs() > cap_percent {
        return SpreadState::unavailable(format!("spread magnitude beyond {cap_percent}% cap"));
    }

    SpreadState {
        percent: Some(round_to(spread, 2)),
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: f64 = 50.0;

    #[test]
    fn spread_between_comparable_prices() {
        let state = cross_market_spread(Some(101.0), Some(100.0), CAP);
        assert_eq!(state.percent, Some(1.0));
        assert_eq!(state.reason, None);

        let negative = cross_market_spread(Some(99.0), Some(100.0), CAP);
        assert_eq!(negative.percent, Some(-1.0));
    }

    #[test]
    fn missing_sides_name_the_missing_market() {
        let both = cross_market_spread(None, None, CAP);
        assert_eq!(both.reason.as_deref(), Some("no recent prices for either market"));

        let a = cross_market_spread(None, Some(100.0), CAP);
        assert_eq!(a.reason.as_deref(), Some("no recent price for market A"));

        let b = cross_market_spread(Some(100.0), None, CAP);
        assert_eq!(b.reason.as_deref(), Some("no recent price for market B"));
    }

    #[test]
    fn direction_incompatible_prices_are_refused() {
        // Observed in the wild: USDC-per-WETH vs WETH-per-UNI. The naive
        // formula would report a ~1.5 billion percent spread.
        let state = cross_market_spread(Some(3_880.0), Some(0.000_257), CAP);
        assert_eq!(state.percent, None);
        let reason = state.reason.unwrap();
        assert!(reason.contains("direction-incompatible"), "{reason}");
    }

    #[test]
    fn ratio_just_under_the_limit_is_still_compared() {
        // 99x apart is absurd but direction-compatible; the magnitude cap
        // suppresses it instead.
        let state = cross_market_spread(Some(99.0), Some(1.0), CAP);
        assert_eq!(state.percent, None);
        assert!(state.reason.unwrap().contains("cap"));
    }

    #[test]
    fn magnitude_cap_suppresses_large_spreads() {
        let state = cross_market_spread(Some(160.0), Some(100.0), CAP);
        assert_eq!(state.percent, None);
        assert!(state.reason.is_some());

        let at_cap = cross_market_spread(Some(150.0), Some(100.0), CAP);
        assert_eq!(at_cap.percent, Some(50.0));
    }

    #[test]
    fn non_positive_prices_are_refused() {
        let state = cross_market_spread(Some(0.0), Some(100.0), CAP);
        assert_eq!(state.percent, None);
        assert!(state.reason.unwrap().contains("non-positive"));
    }
}
