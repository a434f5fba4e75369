//! Viewing patterns and next-access prediction

use std::collections::{HashMap, VecDeque};

/// Bounded access history per cache key.
///
/// The predicted next access is the last access plus an exponential moving
/// average of the observed intervals between accesses.
#[derive(Debug, Clone)]
pub struct PatternStore {
    history: HashMap<String, VecDeque<i64>>,
    capacity: usize,
    smoothing: f64,
    dirty: bool,
}

impl PatternStore {
    pub fn new(capacity: usize, smoothing: f64) -> Self {
        Self {
            history: HashMap::new(),
            capacity: capacity.max(2),
            smoothing,
            dirty: false,
        }
    }

    /// Rebuild from persisted histories, trimming each to `capacity`.
    pub fn from_snapshot(snapshot: HashMap<String, Vec<i64>>, capacity: usize, smoothing: f64) -> Self {
        let mut store = Self::new(capacity, smoothing);
        for (key, mut timestamps) in snapshot {
            timestamps.sort_unstable();
            let skip = timestamps.len().saturating_sub(store.capacity);
            store
                .history
                .insert(key, timestamps.into_iter().skip(skip).collect());
        }
        store
    }

    /// Record an access at `at`, returning the updated prediction.
    pub fn record(&mut self, key: &str, at: i64) -> Option<i64> {
        let timestamps = self.history.entry(key.to_string()).or_default();
        timestamps.push_back(at);
        while timestamps.len() > self.capacity {
            timestamps.pop_front();
        }
        self.dirty = true;
        self.predict(key)
    }

    pub fn predict(&self, key: &str) -> Option<i64> {
        let timestamps = self.history.get(key)?;
        let last = *timestamps.back()?;

        let mut intervals = timestamps
            .iter()
            .zip(timestamps.iter().skip(1))
            .map(|(earlier, later)| (later - earlier) as f64);

        let first = intervals.next()?;
        let average = intervals.fold(first, |ema, interval| {
            self.smoothing * interval + (1.0 - self.smoothing) * ema
        });

        Some(last.saturating_add(average.round() as i64))
    }

    pub fn history(&self, key: &str) -> Option<&VecDeque<i64>> {
        self.history.get(key)
    }

    pub fn forget(&mut self, key: &str) {
        if self.history.remove(key).is_some() {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self) {
        if !self.history.is_empty() {
            self.dirty = true;
        }
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Whether anything changed since the last [`PatternStore::take_snapshot`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flag unsaved changes again, e.g. after a failed write.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Copy for persistence; clears the dirty flag.
    pub fn take_snapshot(&mut self) -> HashMap<String, Vec<i64>> {
        self.dirty = false;
        self.history
            .iter()
            .map(|(key, timestamps)| (key.clone(), timestamps.iter().copied().collect()))
            .collect()
    }
}
