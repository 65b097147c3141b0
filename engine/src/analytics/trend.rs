//! Headline price trend across the preview window.

use std::fmt;

use crate::analytics::round_to;
use crate::event::SwapEvent;

/// Trend is only worth a headline above this magnitude.
pub const MIN_REPORTABLE_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSignal {
    pub percent: f64,
    pub direction: TrendDirection,
}

impl fmt::Display for TrendSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self.direction {
            TrendDirection::Rising => "rising",
            TrendDirection::Falling => "falling",
        };
        write!(f, "{word} {:+.2}%", self.percent)
    }
}

/// Percent move from the oldest to the newest preview row.
///
/// Only defined when both rows belong to the same market; the newest and
/// oldest swap coming from different pools says nothing about either
/// pool's direction. Magnitudes beyond `cap_percent` are treated as unit
/// mismatches and suppressed, and moves at or below the reportable
/// threshold stay quiet.
pub fn price_trend(newest: &SwapEvent, oldest: &SwapEvent, cap_percent: f64) -> Option<TrendSignal> {
    if newest.market_id != oldest.market_id {
        return None;
    }
    if !oldest.price.is_finite() || oldest.price <= 0.0 || !newest.price.is_finite() {
        return None;
    }

    let percent = (newest.price - oldest.price) / oldest.price * 100.0;
    if !percent.is_finite() || percent.abs() > cap_percent {
        return None;
    }
    if percent.abs() <= MIN_REPORTABLE_PERCENT {
        return None;
    }

    let direction = if percent > 0.0 {
        TrendDirection::Rising
    } else {
        TrendDirection::Falling
    };
    Some(TrendSignal {
        percent: round_to(percent, 2),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swap(market_id: &str, ts: u64, price: f64) -> SwapEvent {
        SwapEvent {
            timestamp: ts,
            block_number: 1,
            tx_hash: "0xabc".into(),
            log_index: 0,
            market_id: market_id.into(),
            token_in: "0xa".into(),
            token_in_symbol: "WETH".into(),
            token_in_decimals: 18,
            token_out: "0xb".into(),
            token_out_symbol: "USDC".into(),
            token_out_decimals: 6,
            amount_in: "1".into(),
            amount_out: "1".into(),
            amount_in_normalized: 1.0,
            amount_out_normalized: price,
            price,
            explorer_link: String::new(),
            delta_vs_other_market: None,
        }
    }

    const CAP: f64 = 200.0;

    #[test]
    fn cross_market_endpoints_produce_no_trend() {
        let newest = swap("0xpool_a", 400, 2_500.0);
        let oldest = swap("0xpool_b", 100, 0.000_4);
        assert_eq!(price_trend(&newest, &oldest, CAP), None);
    }

    #[test]
    fn rising_and_falling_moves_are_reported() {
        let oldest = swap("0xpool_a", 100, 100.0);

        let up = price_trend(&swap("0xpool_a", 400, 102.5), &oldest, CAP).unwrap();
        assert_eq!(up.direction, TrendDirection::Rising);
        assert_eq!(up.percent, 2.5);
        assert_eq!(up.to_string(), "rising +2.50%");

        let down = price_trend(&swap("0xpool_a", 400, 97.0), &oldest, CAP).unwrap();
        assert_eq!(down.direction, TrendDirection::Falling);
        assert_eq!(down.to_string(), "falling -3.00%");
    }

    #[test]
    fn small_moves_stay_quiet() {
        let oldest = swap("0xpool_a", 100, 100.0);
        let newest = swap("0xpool_a", 400, 100.9);
        assert_eq!(price_trend(&newest, &oldest, CAP), None);
    }

    #[test]
    fn implausible_magnitudes_are_suppressed() {
        let oldest = swap("0xpool_a", 100, 1.0);
        let newest = swap("0xpool_a", 400, 4.5);
        assert_eq!(price_trend(&newest, &oldest, CAP), None);
    }

    #[test]
    fn zero_base_price_yields_no_trend() {
        let oldest = swap("0xpool_a", 100, 0.0);
        let newest = swap("0xpool_a", 400, 5.0);
        assert_eq!(price_trend(&newest, &oldest, CAP), None);
    }
}
