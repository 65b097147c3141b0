use std::collections::{HashSet, VecDeque};
use std::path::Path;

use crate::errors::EngineError;
use crate::persist;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Insertion-ordered bounded set of composite event keys.
///
/// Guards against re-recording swaps that upstream pages return more than
/// once. At capacity the oldest inserted key is evicted first; `prune`
/// reconciles the set with the rolling window after every trim so keys do
/// not outlive their rows.
#[derive(Debug)]
pub struct DedupTracker {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl DedupTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            seen: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Records a key, evicting the oldest entry when full.
    /// Returns `false` when the key was already present.
    pub fn add(&mut self, key: &str) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.order.push_back(key.to_string());
        self.seen.insert(key.to_string());
        true
    }

    /// Drops the given keys, typically those whose rows just left the
    /// rolling window.
    pub fn prune(&mut self, dropped: &HashSet<String>) {
        if dropped.is_empty() {
            return;
        }
        self.order.retain(|key| !dropped.contains(key));
        for key in dropped {
            self.seen.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Restores the tracker from disk; a missing or unreadable file yields
    /// an empty tracker. Replaying through `add` re-applies the capacity
    /// bound even if the file was written with a larger one.
    pub fn load(path: &Path, capacity: usize) -> Self {
        let mut tracker = Self::new(capacity);
        if let Some(keys) = persist::load_json::<Vec<String>>(path) {
            for key in &keys {
                tracker.add(key);
            }
        }
        tracker
    }

    /// Persists keys in insertion order.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let keys: Vec<&String> = self.order.iter().collect();
        persist::write_json_atomic(path, &keys)
    }
}
