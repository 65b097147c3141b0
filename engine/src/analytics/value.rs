//! USD value estimation for swap rows.

use crate::analytics::round_to;
use crate::event::SwapEvent;

/// Symbols treated as 1:1 with USD.
pub const STABLE_SYMBOLS: &[&str] = &["USDC", "USDCE", "USDT", "DAI"];
pub const ETH_SYMBOLS: &[&str] = &["WETH", "ETH"];
/// Quote legs trusted for reference-price inference. Deliberately narrower
/// than `STABLE_SYMBOLS`; thin DAI pools skew medians.
const INFERENCE_QUOTE_SYMBOLS: &[&str] = &["USDC", "USDT"];

/// Plausibility band for an inferred ETH/USD price.
pub const INFERRED_PRICE_MIN: f64 = 100.0;
pub const INFERRED_PRICE_MAX: f64 = 100_000.0;

pub const WETH_ESTIMATE_METHOD: &str = "weth_estimate";
pub const UNKNOWN_METHOD: &str = "unknown";

/// A row's estimated USD size plus how it was derived: a stable symbol
/// taken at face value, `"weth_estimate"`, or `"unknown"` with zero value.
#[derive(Debug, Clone, PartialEq)]
pub struct UsdEstimate {
    pub value: f64,
    pub method: String,
}

fn matches_any(symbol: &str, list: &[&str]) -> bool {
    list.iter().any(|known| symbol.eq_ignore_ascii_case(known))
}

/// Estimates a swap's USD size. Stable legs are read directly, ETH legs are
/// scaled by `reference_price_usd`, anything else is reported as unknown
/// rather than guessed.
pub fn usd_value_estimate(event: &SwapEvent, reference_price_usd: f64) -> UsdEstimate {
    let legs = [
        (&event.token_out_symbol, event.amount_out_normalized),
        (&event.token_in_symbol, event.amount_in_normalized),
    ];

    for (symbol, amount) in &legs {
        if matches_any(symbol, STABLE_SYMBOLS) {
            return UsdEstimate {
                value: round_to(amount.max(0.0), 2),
                method: symbol.to_ascii_uppercase(),
            };
        }
    }
    for (symbol, amount) in &legs {
        if matches_any(symbol, ETH_SYMBOLS) {
            return UsdEstimate {
                value: round_to(amount.max(0.0) * reference_price_usd, 2),
                method: WETH_ESTIMATE_METHOD.to_string(),
            };
        }
    }

    UsdEstimate {
        value: 0.0,
        method: UNKNOWN_METHOD.to_string(),
    }
}

/// Median ETH/USD price implied by recent WETH<->stable swaps, if any look
/// plausible. Swaps against other tokens are ignored, and a median outside
/// the plausibility band is discarded wholesale.
pub fn infer_reference_price(rows: &[SwapEvent]) -> Option<f64> {
    let mut prices: Vec<f64> = Vec::new();
    for row in rows {
        let sym_in = &row.token_in_symbol;
        let sym_out = &row.token_out_symbol;
        let (amount_in, amount_out) = (row.amount_in_normalized, row.amount_out_normalized);

        if matches_any(sym_in, ETH_SYMBOLS)
            && matches_any(sym_out, INFERENCE_QUOTE_SYMBOLS)
            && amount_in > 0.0
        {
            prices.push(amount_out / amount_in);
        } else if matches_any(sym_out, ETH_SYMBOLS)
            && matches_any(sym_in, INFERENCE_QUOTE_SYMBOLS)
            && amount_out > 0.0
        {
            prices.push(amount_in / amount_out);
        }
    }

    if prices.is_empty() {
        return None;
    }
    prices.sort_by(|a, b| a.total_cmp(b));
    let n = prices.len();
    let median = if n % 2 == 1 {
        prices[n / 2]
    } else {
        (prices[n / 2 - 1] + prices[n / 2]) / 2.0
    };

    (median > INFERRED_PRICE_MIN && median < INFERRED_PRICE_MAX).then_some(median)
}
