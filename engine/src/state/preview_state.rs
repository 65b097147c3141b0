use std::collections::{HashSet, VecDeque};
use std::path::Path;

use crate::errors::EngineError;
use crate::persist;

pub const DEFAULT_CAPACITY: usize = 10;

/// Remembers which event keys recent previews included, so the next
/// preview can bias selection toward rows a reader has not seen yet.
/// Freshness signal only; it never affects what gets recorded.
#[derive(Debug)]
pub struct PreviewState {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl PreviewState {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            seen: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// True when the key has not appeared in a recent preview.
    pub fn is_new(&self, key: &str) -> bool {
        !self.seen.contains(key)
    }

    /// Records the keys of a just-published preview, evicting the oldest
    /// remembered keys beyond capacity.
    pub fn update(&mut self, published: &[String]) {
        for key in published {
            if self.seen.contains(key) {
                continue;
            }
            if self.order.len() >= self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.seen.remove(&evicted);
                }
            }
            self.order.push_back(key.clone());
            self.seen.insert(key.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn load(path: &Path, capacity: usize) -> Self {
        let mut state = Self::new(capacity);
        if let Some(keys) = persist::load_json::<Vec<String>>(path) {
            state.update(&keys);
        }
        state
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let keys: Vec<&String> = self.order.iter().collect();
        persist::write_json_atomic(path, &keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn everything_is_new_at_start() {
        let state = PreviewState::new(10);
        assert!(state.is_new("0xa:0"));
        assert!(state.is_empty());
    }

    #[test]
    fn published_keys_stop_being_new() {
        let mut state = PreviewState::new(10);
        state.update(&keys(&["0xa:0", "0xb:1"]));
        assert!(!state.is_new("0xa:0"));
        assert!(!state.is_new("0xb:1"));
        assert!(state.is_new("0xc:2"));
    }

    #[test]
    fn capacity_forgets_oldest_published_keys() {
        let mut state = PreviewState::new(2);
        state.update(&keys(&["0xa:0", "0xb:1", "0xc:2"]));
        // Oldest key fell out, so it would count as fresh again.
        assert!(state.is_new("0xa:0"));
        assert!(!state.is_new("0xc:2"));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview_state.json");

        let mut state = PreviewState::new(10);
        state.update(&keys(&["0xa:0", "0xb:1"]));
        state.save(&path).unwrap();

        let restored = PreviewState::load(&path, 10);
        assert!(!restored.is_new("0xa:0"));
        assert!(restored.is_new("0xc:2"));
    }
}
