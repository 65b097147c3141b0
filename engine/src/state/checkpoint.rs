use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::persist;

/// High-water mark of what has actually been observed and recorded.
///
/// Advances only over timestamps and block numbers seen in fetched pages,
/// never over wall-clock time or the current chain head. A cycle that fails
/// before appending leaves the checkpoint untouched, so the next cycle
/// re-fetches the same ground and deduplication absorbs the overlap.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub last_seen_ts: u64,
    pub last_seen_block: u64,
}

impl Checkpoint {
    /// Monotone advance; values never regress.
    pub fn advance(&mut self, max_ts_seen: u64, max_block_seen: u64) {
        self.last_seen_ts = self.last_seen_ts.max(max_ts_seen);
        self.last_seen_block = self.last_seen_block.max(max_block_seen);
    }

    /// Timestamp below which fetching may stop: the later of the checkpoint
    /// and the window horizon. A fresh checkpoint falls back to the horizon
    /// so a first run backfills exactly one window.
    pub fn watermark_ts(&self, now_ts: u64, window_minutes: u64) -> u64 {
        let horizon = now_ts.saturating_sub(window_minutes * 60);
        self.last_seen_ts.max(horizon)
    }

    pub fn load(path: &Path) -> Self {
        persist::load_json(path).unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        persist::write_json_atomic(path, self)
    }
}
