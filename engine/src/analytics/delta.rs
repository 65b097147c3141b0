//! Per-row percentage deltas for the preview.

use crate::analytics::round_to;
use crate::event::SwapEvent;

/// Percent gap between a price and its market's moving average, rounded to
/// two places. `None` when the average is unavailable or non-positive, or
/// when the magnitude exceeds `cap_percent` (direction-incompatible pair).
pub fn delta_vs_ma(price: f64, moving_average: Option<f64>, cap_percent: f64) -> Option<f64> {
    let ma = moving_average?;
    if !ma.is_finite() || ma <= 0.0 || !price.is_finite() {
        return None;
    }
    let delta = (price - ma) / ma * 100.0;
    if !delta.is_finite() || delta.abs() > cap_percent {
        return None;
    }
    Some(round_to(delta, 2))
}

/// Percent change vs the previous preview row, rounded to three places.
/// Only defined when both rows are from the same market and less than
/// `max_gap_secs` apart; consecutive rows from different markets or across
/// a long quiet gap compare nothing meaningful.
pub fn delta_vs_prev(current: &SwapEvent, previous: &SwapEvent, max_gap_secs: u64) -> Option<f64> {
    if current.market_id != previous.market_id {
        return None;
    }
    let gap = current.timestamp.abs_diff(previous.timestamp);
    if gap >= max_gap_secs {
        return None;
    }
    if !previous.price.is_finite() || previous.price <= 0.0 || !current.price.is_finite() {
        return None;
    }
    let delta = (current.price - previous.price) / previous.price * 100.0;
    if !delta.is_finite() {
        return None;
    }
    Some(round_to(delta, 3))
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

    #[test]
    fn delta_vs_ma_is_unavailable_without_an_average() {
        assert_eq!(delta_vs_ma(100.0, None, 1_000.0), None);
        assert_eq!(delta_vs_ma(100.0, Some(0.0), 1_000.0), None);
        assert_eq!(delta_vs_ma(100.0, Some(-5.0), 1_000.0), None);
    }

    #[test]
    fn delta_vs_ma_computes_signed_percent() {
        assert_eq!(delta_vs_ma(110.0, Some(100.0), 1_000.0), Some(10.0));
        assert_eq!(delta_vs_ma(95.0, Some(100.0), 1_000.0), Some(-5.0));
    }

    #[test]
    fn delta_vs_ma_suppresses_implausible_magnitudes() {
        // A 2500-vs-0.0004 style pairing is a unit mismatch, not a move.
        assert_eq!(delta_vs_ma(2_500.0, Some(0.000_4), 1_000.0), None);
        // 1100% exceeds the default cap; exactly at the cap still publishes.
        assert_eq!(delta_vs_ma(12.0, Some(1.0), 1_000.0), None);
        assert_eq!(delta_vs_ma(11.0, Some(1.0), 1_000.0), Some(1_000.0));
    }

    #[test]
    fn delta_vs_prev_requires_same_market() {
        let current = swap("0xpool_a", 200, 110.0);
        let previous = swap("0xpool_b", 190, 100.0);
        assert_eq!(delta_vs_prev(&current, &previous, 3_600), None);
    }

    #[test]
    fn delta_vs_prev_requires_a_small_gap() {
        let current = swap("0xpool_a", 10_000, 110.0);
        let previous = swap("0xpool_a", 100, 100.0);
        assert_eq!(delta_vs_prev(&current, &previous, 3_600), None);
    }

    #[test]
    fn delta_vs_prev_computes_three_place_percent() {
        let current = swap("0xpool_a", 200, 100.25);
        let previous = swap("0xpool_a", 190, 100.0);
        assert_eq!(delta_vs_prev(&current, &previous, 3_600), Some(0.25));

        let falling = swap("0xpool_a", 210, 99.9);
        assert_eq!(delta_vs_prev(&falling, &previous, 3_600), Some(-0.1));
    }
}
