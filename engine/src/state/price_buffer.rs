use std::collections::{HashMap, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::persist;

pub const DEFAULT_MAX_ENTRIES: usize = 20;
pub const DEFAULT_MAX_AGE_SECS: u64 = 600;
/// Moving-average lookback used by the preview enrichment.
pub const MA_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub timestamp: u64,
    pub price: f64,
}

/// Short-horizon price memory per market.
///
/// Feeds moving averages, spread inputs and activity readings. Entries are
/// bounded both by count and by age relative to the newest point of the
/// same market, so a quiet market cannot pin stale prices forever.
#[derive(Debug)]
pub struct PriceBuffer {
    markets: HashMap<String, VecDeque<PricePoint>>,
    max_entries: usize,
    max_age_secs: u64,
}

impl PriceBuffer {
    pub fn new(max_entries: usize, max_age_secs: u64) -> Self {
        Self {
            markets: HashMap::new(),
            max_entries: max_entries.max(1),
            max_age_secs,
        }
    }

    /// Records an observed price. Points are kept ordered by timestamp even
    /// when pages deliver swaps newest-first.
    pub fn update(&mut self, market_id: &str, timestamp: u64, price: f64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        let points = self.markets.entry(market_id.to_string()).or_default();

        let unordered = points.back().is_some_and(|last| last.timestamp > timestamp);
        points.push_back(PricePoint { timestamp, price });
        if unordered {
            points.make_contiguous().sort_by_key(|p| p.timestamp);
        }

        let newest = points.back().map(|p| p.timestamp).unwrap_or(0);
        let horizon = newest.saturating_sub(self.max_age_secs);
        while points.front().is_some_and(|p| p.timestamp < horizon) {
            points.pop_front();
        }
        while points.len() > self.max_entries {
            points.pop_front();
        }
    }

    /// Mean of the newest `window` points, `None` when the market has no
    /// points at all. Never substitutes zero for an unknown average.
    pub fn moving_average(&self, market_id: &str, window: usize) -> Option<f64> {
        let points = self.markets.get(market_id)?;
        if points.is_empty() || window == 0 {
            return None;
        }
        let take = window.min(points.len());
        let sum: f64 = points.iter().rev().take(take).map(|p| p.price).sum();
        Some(sum / take as f64)
    }

    /// Newest recorded price, only if it is at most `max_age_secs` old.
    pub fn latest_price(&self, market_id: &str, now_ts: u64, max_age_secs: u64) -> Option<f64> {
        let newest = self.markets.get(market_id)?.back()?;
        if now_ts.saturating_sub(newest.timestamp) <= max_age_secs {
            Some(newest.price)
        } else {
            None
        }
    }

    /// Swaps per minute observed within `window_secs` of `now_ts`.
    pub fn activity_rate(&self, market_id: &str, window_secs: u64, now_ts: u64) -> f64 {
        let Some(points) = self.markets.get(market_id) else {
            return 0.0;
        };
        let horizon = now_ts.saturating_sub(window_secs);
        let recent = points.iter().filter(|p| p.timestamp >= horizon).count();
        recent as f64 / (window_secs.max(1) as f64 / 60.0)
    }

    /// Drops points older than `cutoff_ts` across all markets, mirroring the
    /// rolling-window prune of the durable dataset.
    pub fn prune_by_timestamp(&mut self, cutoff_ts: u64) {
        for points in self.markets.values_mut() {
            points.retain(|p| p.timestamp >= cutoff_ts);
        }
        self.markets.retain(|_, points| !points.is_empty());
    }

    pub fn total_points(&self) -> usize {
        self.markets.values().map(VecDeque::len).sum()
    }

    pub fn load(path: &Path, max_entries: usize, max_age_secs: u64) -> Self {
        let mut buffer = Self::new(max_entries, max_age_secs);
        if let Some(map) = persist::load_json::<HashMap<String, Vec<PricePoint>>>(path) {
            for (market_id, points) in map {
                for point in points {
                    buffer.update(&market_id, point.timestamp, point.price);
                }
            }
        }
        buffer
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let map: HashMap<&String, Vec<&PricePoint>> = self
            .markets
            .iter()
            .map(|(market_id, points)| (market_id, points.iter().collect()))
            .collect();
        persist::write_json_atomic(path, &map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M: &str = "0xpool_a";

    fn buffer_with(prices: &[(u64, f64)]) -> PriceBuffer {
        let mut buffer = PriceBuffer::new(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_AGE_SECS);
        for (ts, price) in prices {
            buffer.update(M, *ts, *price);
        }
        buffer
    }

    #[test]
    fn moving_average_is_unavailable_without_points() {
        let buffer = PriceBuffer::new(20, 600);
        assert_eq!(buffer.moving_average(M, MA_WINDOW), None);
    }

    #[test]
    fn moving_average_uses_newest_points_only() {
        let buffer = buffer_with(&[
            (100, 10.0),
            (110, 20.0),
            (120, 30.0),
            (130, 40.0),
            (140, 50.0),
            (150, 60.0),
        ]);
        // Newest five of six points: 20..=60.
        assert_eq!(buffer.moving_average(M, 5), Some(40.0));
        assert_eq!(buffer.moving_average(M, 2), Some(55.0));
    }

    #[test]
    fn single_point_average_is_that_point() {
        let buffer = buffer_with(&[(100, 12.5)]);
        assert_eq!(buffer.moving_average(M, 5), Some(12.5));
    }

    #[test]
    fn out_of_order_updates_keep_points_sorted() {
        let buffer = buffer_with(&[(300, 3.0), (100, 1.0), (200, 2.0)]);
        assert_eq!(buffer.latest_price(M, 300, 600), Some(3.0));
        assert_eq!(buffer.moving_average(M, 2), Some(2.5));
    }

    #[test]
    fn latest_price_respects_max_age() {
        let buffer = buffer_with(&[(1_000, 42.0)]);
        assert_eq!(buffer.latest_price(M, 1_500, 600), Some(42.0));
        assert_eq!(buffer.latest_price(M, 1_700, 600), None);
        assert_eq!(buffer.latest_price("0xother", 1_000, 600), None);
    }

    #[test]
    fn count_bound_evicts_oldest_points() {
        let mut buffer = PriceBuffer::new(3, u64::MAX);
        for i in 0..5u64 {
            buffer.update(M, 100 + i, i as f64 + 1.0);
        }
        assert_eq!(buffer.total_points(), 3);
        assert_eq!(buffer.moving_average(M, 3), Some(4.0));
    }

    #[test]
    fn age_bound_is_relative_to_newest_point() {
        let mut buffer = PriceBuffer::new(20, 600);
        buffer.update(M, 100, 1.0);
        buffer.update(M, 800, 2.0);
        // 100 is more than 600s older than 800.
        assert_eq!(buffer.total_points(), 1);
        assert_eq!(buffer.moving_average(M, 5), Some(2.0));
    }

    #[test]
    fn non_positive_prices_are_ignored() {
        let mut buffer = PriceBuffer::new(20, 600);
        buffer.update(M, 100, 0.0);
        buffer.update(M, 110, -4.0);
        buffer.update(M, 120, f64::NAN);
        assert_eq!(buffer.total_points(), 0);
    }

    #[test]
    fn activity_rate_counts_recent_points_per_minute() {
        let buffer = buffer_with(&[(940, 1.0), (950, 1.0), (990, 1.0)]);
        // All three within 120s of now=1000 -> 3 per 2 minutes.
        assert_eq!(buffer.activity_rate(M, 120, 1_000), 1.5);
        assert_eq!(buffer.activity_rate("0xother", 120, 1_000), 0.0);
    }

    #[test]
    fn prune_by_timestamp_drops_older_points_and_empty_markets() {
        let mut buffer = buffer_with(&[(100, 1.0), (200, 2.0)]);
        buffer.update("0xpool_b", 50, 9.0);

        buffer.prune_by_timestamp(150);

        assert_eq!(buffer.total_points(), 1);
        assert_eq!(buffer.latest_price(M, 200, 600), Some(2.0));
        assert_eq!(buffer.latest_price("0xpool_b", 200, 600), None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price_buffer.json");

        let buffer = buffer_with(&[(100, 1.0), (200, 2.0)]);
        buffer.save(&path).unwrap();

        let restored = PriceBuffer::load(&path, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_AGE_SECS);
        assert_eq!(restored.total_points(), 2);
        assert_eq!(restored.moving_average(M, 5), Some(1.5));
    }

    #[test]
    fn load_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let restored = PriceBuffer::load(&dir.path().join("price_buffer.json"), 20, 600);
        assert_eq!(restored.total_points(), 0);
    }
}
