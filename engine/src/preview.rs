//! Preview artifact: a small enriched slice of the rolling window plus a
//! header summarizing market state. Derived and disposable; it can always
//! be rebuilt from the durable dataset and price buffer.

use std::cmp::Reverse;
use std::collections::HashSet;

use serde::Serialize;

use crate::analytics::{
    AnalyticsCaps, cross_market_spread, delta_vs_ma, delta_vs_prev, price_trend, round_to,
    usd_value_estimate,
};
use crate::event::SwapEvent;
use crate::state::price_buffer::MA_WINDOW;
use crate::state::{PreviewState, PriceBuffer};

pub const DEFAULT_PREVIEW_ROWS: usize = 10;
/// Minimum unseen rows for an all-new preview; below this the preview mixes
/// in previously shown rows so it never looks emptier than the window is.
pub const DEFAULT_MIN_NEW: usize = 2;
/// Rows further apart than this are not compared row-over-row.
pub const PREV_ROW_MAX_GAP_SECS: u64 = 3_600;
/// Buffered prices older than this are not used for the spread.
pub const SPREAD_PRICE_MAX_AGE_SECS: u64 = 600;
pub const DEFAULT_ALERT_THRESHOLD_PERCENT: f64 = 0.5;
/// A row this far off its moving average gets a deviation warning.
pub const DEVIATION_WARN_PERCENT: f64 = 10.0;

/// Size classification of a preview row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowMarker {
    /// Not shown in any recent preview.
    New,
    /// Estimated over 10k USD.
    Whale,
    /// Estimated over 1k USD.
    Large,
    /// More than 5% off the market's moving average.
    Volatile,
    Normal,
}

const WHALE_USD: f64 = 10_000.0;
const LARGE_USD: f64 = 1_000.0;
const VOLATILE_DELTA_PERCENT: f64 = 5.0;

impl RowMarker {
    fn classify(is_new: bool, usd_value: f64, delta_ma: Option<f64>) -> Self {
        if is_new {
            Self::New
        } else if usd_value > WHALE_USD {
            Self::Whale
        } else if usd_value > LARGE_USD {
            Self::Large
        } else if delta_ma.is_some_and(|d| d.abs() > VOLATILE_DELTA_PERCENT) {
            Self::Volatile
        } else {
            Self::Normal
        }
    }
}

/// Coarse liveness classification for the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    HighActivity,
    Active,
    Recent,
    Quiet,
    Stale,
    /// Nothing recorded yet.
    Idle,
}

impl ActivityStatus {
    fn classify(swaps_per_min: f64, updated_ago_secs: u64) -> Self {
        if swaps_per_min > 1.0 {
            Self::HighActivity
        } else if swaps_per_min > 0.1 {
            Self::Active
        } else if updated_ago_secs < 60 {
            Self::Recent
        } else if updated_ago_secs < 300 {
            Self::Quiet
        } else {
            Self::Stale
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    #[serde(flatten)]
    pub event: SwapEvent,
    /// Percent off the market's 5-swap moving average, if one exists.
    pub delta_vs_ma: Option<f64>,
    /// Percent change vs the next row shown, same market and close in time.
    pub delta_vs_prev_row: Option<f64>,
    pub swap_value_usd: f64,
    pub value_method: String,
    pub is_new: bool,
    pub marker: RowMarker,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation_warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewHeader {
    pub updated_ago_seconds: u64,
    pub window_minutes: u64,
    pub activity_swaps_per_min: f64,
    pub market_ids: Vec<String>,
    pub spread_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread_reason: Option<String>,
    pub status: ActivityStatus,
    pub activity_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_trend: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewArtifact {
    pub header: PreviewHeader,
    pub preview_rows: Vec<PreviewRow>,
    pub total_rows: usize,
    pub last_updated: String,
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub rows: usize,
    pub min_new: usize,
    pub window_minutes: u64,
    pub market_ids: Vec<String>,
    pub caps: AnalyticsCaps,
    pub alert_threshold_percent: f64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_PREVIEW_ROWS,
            min_new: DEFAULT_MIN_NEW,
            window_minutes: 60,
            market_ids: Vec::new(),
            caps: AnalyticsCaps::default(),
            alert_threshold_percent: DEFAULT_ALERT_THRESHOLD_PERCENT,
        }
    }
}

/// Builds the preview artifact from the full window. Returns the artifact
/// and the keys it displays, which the caller feeds back into
/// [`PreviewState::update`] after a successful publish.
pub fn build_preview(
    window: &[SwapEvent],
    buffer: &PriceBuffer,
    preview_state: &PreviewState,
    reference_price_usd: f64,
    now_ts: u64,
    cfg: &PreviewConfig,
) -> (PreviewArtifact, Vec<String>) {
    let mut sorted: Vec<&SwapEvent> = window.iter().collect();
    sorted.sort_by_key(|row| Reverse((row.timestamp, row.block_number)));

    if sorted.is_empty() {
        let artifact = PreviewArtifact {
            header: empty_header(cfg),
            preview_rows: Vec::new(),
            total_rows: 0,
            last_updated: common::time::iso_now(),
        };
        return (artifact, Vec::new());
    }

    let selected = select_rows(&sorted, preview_state, cfg);
    let published_keys: Vec<String> = selected.iter().map(|row| row.key()).collect();

    let mut rows: Vec<PreviewRow> = selected
        .iter()
        .map(|event| enrich_row(event, buffer, preview_state, reference_price_usd, cfg))
        .collect();
    for i in 0..rows.len().saturating_sub(1) {
        rows[i].delta_vs_prev_row =
            delta_vs_prev(&rows[i].event, &rows[i + 1].event, PREV_ROW_MAX_GAP_SECS);
    }

    let header = build_header(&sorted, &selected, buffer, now_ts, cfg);
    let artifact = PreviewArtifact {
        header,
        preview_rows: rows,
        total_rows: sorted.len(),
        last_updated: common::time::iso_now(),
    };
    (artifact, published_keys)
}

/// Picks up to `cfg.rows` rows, preferring ones not shown recently. With
/// enough unseen rows the preview is entirely fresh; otherwise unseen rows
/// lead and the newest already-shown rows fill the rest.
fn select_rows<'a>(
    sorted_desc: &[&'a SwapEvent],
    preview_state: &PreviewState,
    cfg: &PreviewConfig,
) -> Vec<&'a SwapEvent> {
    let fresh: Vec<&SwapEvent> = sorted_desc
        .iter()
        .copied()
        .filter(|row| preview_state.is_new(&row.key()))
        .collect();

    if fresh.len() >= cfg.min_new {
        return fresh.into_iter().take(cfg.rows).collect();
    }

    let fresh_keys: HashSet<String> = fresh.iter().map(|row| row.key()).collect();
    let mut selected = fresh;
    selected.extend(
        sorted_desc
            .iter()
            .copied()
            .filter(|row| !fresh_keys.contains(&row.key())),
    );
    selected.truncate(cfg.rows);
    selected
}

fn enrich_row(
    event: &SwapEvent,
    buffer: &PriceBuffer,
    preview_state: &PreviewState,
    reference_price_usd: f64,
    cfg: &PreviewConfig,
) -> PreviewRow {
    let ma = buffer.moving_average(&event.market_id, MA_WINDOW);
    let delta_ma = delta_vs_ma(event.price, ma, cfg.caps.delta_cap_percent);
    let estimate = usd_value_estimate(event, reference_price_usd);
    let is_new = preview_state.is_new(&event.key());

    let deviation_warning = delta_ma
        .filter(|d| d.abs() > DEVIATION_WARN_PERCENT)
        .map(|d| format!("{d:+.1}% vs {MA_WINDOW}-swap average"));

    PreviewRow {
        event: event.clone(),
        delta_vs_ma: delta_ma,
        delta_vs_prev_row: None,
        swap_value_usd: estimate.value,
        value_method: estimate.method,
        is_new,
        marker: RowMarker::classify(is_new, estimate.value, delta_ma),
        deviation_warning,
    }
}

fn build_header(
    sorted_desc: &[&SwapEvent],
    selected: &[&SwapEvent],
    buffer: &PriceBuffer,
    now_ts: u64,
    cfg: &PreviewConfig,
) -> PreviewHeader {
    let newest_ts = sorted_desc.first().map(|row| row.timestamp).unwrap_or(0);
    let updated_ago_seconds = now_ts.saturating_sub(newest_ts);

    let horizon = now_ts.saturating_sub(cfg.window_minutes * 60);
    let recent: Vec<&&SwapEvent> = sorted_desc
        .iter()
        .filter(|row| row.timestamp >= horizon)
        .collect();
    let activity_swaps_per_min = if recent.len() >= 2 {
        let newest = recent.first().map(|row| row.timestamp).unwrap_or(0);
        let oldest = recent.last().map(|row| row.timestamp).unwrap_or(0);
        let span = newest.saturating_sub(oldest);
        if span > 0 {
            round_to(recent.len() as f64 / span as f64 * 60.0, 2)
        } else {
            0.0
        }
    } else {
        0.0
    };

    let spread = if cfg.market_ids.len() == 2 {
        let price_a = buffer.latest_price(&cfg.market_ids[0], now_ts, SPREAD_PRICE_MAX_AGE_SECS);
        let price_b = buffer.latest_price(&cfg.market_ids[1], now_ts, SPREAD_PRICE_MAX_AGE_SECS);
        cross_market_spread(price_a, price_b, cfg.caps.spread_cap_percent)
    } else {
        crate::analytics::SpreadState {
            percent: None,
            reason: Some("requires exactly 2 markets".to_string()),
        }
    };

    let alert = spread
        .percent
        .filter(|p| p.abs() > cfg.alert_threshold_percent)
        .map(|p| {
            let direction = if p > 0.0 {
                "market A -> market B"
            } else {
                "market B -> market A"
            };
            format!("arbitrage signal: {direction} {:.2}%", p.abs())
        });

    let price_trend = match (selected.first(), selected.last()) {
        (Some(newest), Some(oldest)) if selected.len() >= 2 => {
            price_trend(newest, oldest, cfg.caps.trend_cap_percent).map(|t| t.to_string())
        }
        _ => None,
    };

    let status = ActivityStatus::classify(activity_swaps_per_min, updated_ago_seconds);
    let activity_summary = format!(
        "{} swaps/{}min | updated {}s ago",
        recent.len(),
        cfg.window_minutes,
        updated_ago_seconds
    );

    PreviewHeader {
        updated_ago_seconds,
        window_minutes: cfg.window_minutes,
        activity_swaps_per_min,
        market_ids: cfg.market_ids.clone(),
        spread_percent: spread.percent,
        spread_reason: spread.reason,
        status,
        activity_summary,
        alert,
        price_trend,
    }
}

fn empty_header(cfg: &PreviewConfig) -> PreviewHeader {
    PreviewHeader {
        updated_ago_seconds: 0,
        window_minutes: cfg.window_minutes,
        activity_swaps_per_min: 0.0,
        market_ids: cfg.market_ids.clone(),
        spread_percent: None,
        spread_reason: Some("no data".to_string()),
        status: ActivityStatus::Idle,
        activity_summary: format!("0 swaps/{}min | no data yet", cfg.window_minutes),
        alert: None,
        price_trend: None,
    }
}
