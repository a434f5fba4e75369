//! # Bounded Metadata Cache
//!
//! In-memory key/value cache bounded by entry count and by total size, with a
//! per-entry time-to-live.
//!
//! ## Overview
//!
//! Recency is tracked by an [`LruCache`] used in unbounded mode; both bounds
//! are enforced explicitly after every insert so that the size bound can use a
//! caller-supplied measure of each value. Time comes from an injected
//! [`Clock`], so expiry is deterministic under test.
//!
//! Expired entries are never returned. They are removed lazily when read and
//! eagerly by [`BoundedCache::cleanup`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_cache::metadata_cache::{BoundedCache, BoundedCacheConfig};
//! use std::time::Duration;
//!
//! let config = BoundedCacheConfig::default()
//!     .with_max_entries(128)
//!     .with_default_ttl(Duration::from_secs(60));
//! let mut cache = BoundedCache::new(config, |value: &String| value.len() as u64)?;
//!
//! cache.set("thumb:42".to_string(), "https://cdn/42.jpg".to_string());
//! assert!(cache.has(&"thumb:42".to_string()));
//! ```

use crate::error::{CacheError, Result};
use bridge_traits::time::{Clock, SystemClock};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Invoked with each entry dropped by capacity eviction or expiry.
pub type EvictionCallback<K, V> = Box<dyn FnMut(&K, &V) -> Result<()> + Send>;

type SizeFn<V> = Box<dyn Fn(&V) -> u64 + Send + Sync>;

/// Bounds and default TTL for a [`BoundedCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct BoundedCacheConfig {
    /// Maximum number of entries (default: 1000)
    pub max_entries: usize,

    /// Maximum total size as measured by the cache's size function
    /// (default: 50MB)
    pub max_size: u64,

    /// TTL applied by [`BoundedCache::set`] (default: 5 minutes)
    pub default_ttl: Duration,
}

impl Default for BoundedCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            max_size: 50 * 1024 * 1024,
            default_ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl BoundedCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be at least 1".to_string());
        }

        if self.max_size == 0 {
            return Err("max_size must be greater than 0".to_string());
        }

        if self.default_ttl.is_zero() {
            return Err("default_ttl must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Counters accumulated since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundedCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to satisfy the count or size bound
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}

impl BoundedCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

struct Slot<V> {
    value: V,
    size: u64,
    expires_at: i64,
}

/// LRU cache with entry-count, size and TTL bounds.
pub struct BoundedCache<K, V> {
    entries: LruCache<K, Slot<V>>,
    config: BoundedCacheConfig,
    size_of: SizeFn<V>,
    on_evict: Option<EvictionCallback<K, V>>,
    clock: Arc<dyn Clock>,
    total_size: u64,
    stats: BoundedCacheStats,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty cache measuring values with `size_of`.
    ///
    /// # Errors
    ///
    /// [`CacheError::Configuration`] if any bound or the default TTL is zero.
    pub fn new<F>(config: BoundedCacheConfig, size_of: F) -> Result<Self>
    where
        F: Fn(&V) -> u64 + Send + Sync + 'static,
    {
        config.validate().map_err(|e| {
            CacheError::Configuration(format!("Invalid metadata cache configuration: {}", e))
        })?;

        Ok(Self {
            entries: LruCache::unbounded(),
            config,
            size_of: Box::new(size_of),
            on_evict: None,
            clock: Arc::new(SystemClock),
            total_size: 0,
            stats: BoundedCacheStats::default(),
        })
    }

    /// Use `clock` for TTL deadlines instead of system time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_eviction_callback(mut self, callback: EvictionCallback<K, V>) -> Self {
        self.on_evict = Some(callback);
        self
    }

    pub fn config(&self) -> &BoundedCacheConfig {
        &self.config
    }

    /// Read a live value and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.is_live(key) {
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Whether a live value exists. Does not change recency.
    pub fn has(&mut self, key: &K) -> bool {
        self.is_live(key)
    }

    /// Insert with the default TTL. See [`BoundedCache::set_with_ttl`].
    pub fn set(&mut self, key: K, value: V) -> bool {
        let ttl = self.config.default_ttl;
        self.set_with_ttl(key, value, ttl)
    }

    /// Insert or replace `key`, then evict least recently used entries until
    /// both bounds hold.
    ///
    /// Returns `false` without touching the cache when the value alone is
    /// larger than the size bound or `ttl` is zero.
    pub fn set_with_ttl(&mut self, key: K, value: V, ttl: Duration) -> bool {
        let size = (self.size_of)(&value);
        if size > self.config.max_size {
            debug!(size, max_size = self.config.max_size, "Rejected oversized value");
            return false;
        }
        if ttl.is_zero() {
            debug!("Rejected value with zero TTL");
            return false;
        }

        if let Some(previous) = self.entries.pop(&key) {
            self.total_size -= previous.size;
        }

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = self.clock.unix_timestamp_millis().saturating_add(ttl_ms);
        self.entries.put(
            key,
            Slot {
                value,
                size,
                expires_at,
            },
        );
        self.total_size += size;

        self.enforce_bounds();
        true
    }

    /// Remove `key` without invoking the eviction callback.
    pub fn delete(&mut self, key: &K) -> bool {
        match self.entries.pop(key) {
            Some(slot) => {
                self.total_size -= slot.size;
                true
            }
            None => false,
        }
    }

    /// Remove everything without invoking the eviction callback.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_size = 0;
    }

    /// Remove all expired entries, returning how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.unix_timestamp_millis();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.expire(key);
        }
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet removed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn stats(&self) -> BoundedCacheStats {
        self.stats
    }

    fn is_live(&mut self, key: &K) -> bool {
        let now = self.clock.unix_timestamp_millis();
        let expired = match self.entries.peek(key) {
            None => return false,
            Some(slot) => slot.expires_at <= now,
        };

        if expired {
            self.expire(key);
        }
        !expired
    }

    fn expire(&mut self, key: &K) {
        if let Some(slot) = self.entries.pop(key) {
            self.total_size -= slot.size;
            self.stats.expirations += 1;
            self.notify(key, &slot.value, "expired");
        }
    }

    fn over_bounds(&self) -> bool {
        self.entries.len() > self.config.max_entries || self.total_size > self.config.max_size
    }

    fn enforce_bounds(&mut self) {
        if !self.over_bounds() {
            return;
        }

        // Dead entries go before live ones.
        self.cleanup();

        while self.over_bounds() {
            let Some((key, slot)) = self.entries.pop_lru() else {
                break;
            };
            self.total_size -= slot.size;
            self.stats.evictions += 1;
            self.notify(&key, &slot.value, "capacity");
        }
    }

    fn notify(&mut self, key: &K, value: &V, reason: &'static str) {
        if let Some(callback) = self.on_evict.as_mut() {
            if let Err(e) = callback(key, value) {
                warn!(reason, error = %e, "Metadata cache eviction callback failed");
            }
        }
    }
}
