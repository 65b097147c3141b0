//! Derived signals computed over the rolling window and price buffer.
//!
//! Every signal here is guarded: division by an unknown or zero base yields
//! "unavailable" (`None`), never a fabricated zero, and implausible
//! magnitudes are suppressed instead of published.

pub mod delta;
pub mod spread;
pub mod trend;
pub mod value;

pub use delta::{delta_vs_ma, delta_vs_prev};
pub use spread::{SpreadState, cross_market_spread};
pub use trend::{TrendDirection, TrendSignal, price_trend};
pub use value::{UsdEstimate, infer_reference_price, usd_value_estimate};

/// Sanity caps applied to derived percentages before publication.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticsCaps {
    /// Max |delta vs moving average|, percent.
    pub delta_cap_percent: f64,
    /// Max |cross-market spread|, percent.
    pub spread_cap_percent: f64,
    /// Max |price trend|, percent.
    pub trend_cap_percent: f64,
}

impl Default for AnalyticsCaps {
    fn default() -> Self {
        Self {
            delta_cap_percent: 1_000.0,
            spread_cap_percent: 50.0,
            trend_cap_percent: 200.0,
        }
    }
}

/// Rounds to `dp` decimal places, the precision published in artifacts.
pub fn round_to(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}
