//! Cache statistics and monitoring

use bridge_traits::network::NetworkQuality;
use serde::{Deserialize, Serialize};

/// Point-in-time statistics about the media cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of indexed entries
    pub total_entries: usize,

    /// Bytes held, primary files plus variants
    pub total_bytes: u64,

    /// Configured budget
    pub max_bytes: u64,

    /// Attached variant files across all entries
    pub variant_files: usize,

    /// Entries per priority tier
    pub high_priority_entries: usize,
    pub normal_priority_entries: usize,
    pub low_priority_entries: usize,

    /// Lookups served, including the internal lookup of every materialisation
    pub requests: u64,

    /// Lookups that found a usable file
    pub hits: u64,

    /// Successful primary downloads
    pub downloads: u64,

    /// Materialisations that fell back to the remote identifier
    pub pass_throughs: u64,

    /// Entries removed by eviction, idle cleanup and memory pressure
    pub evictions: u64,

    /// Eviction sweeps that ran, whether or not they freed anything
    pub eviction_sweeps: u64,

    /// Entries purged because their file disappeared
    pub self_heals: u64,

    /// Network tier the cache is currently adapted to
    pub network_quality: Option<NetworkQuality>,

    /// Persistence is disabled for this session after a load failure
    pub memory_only: bool,

    /// Timestamp when stats were calculated (unix ms)
    pub calculated_at: i64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            return 0.0;
        }

        self.hits as f64 / self.requests as f64
    }

    /// Cache usage as a percentage of the budget.
    pub fn usage_percentage(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }

        (self.total_bytes as f64 / self.max_bytes as f64) * 100.0
    }

    /// Returns true if usage is above `threshold` of the budget.
    pub fn is_near_capacity(&self, threshold: f64) -> bool {
        self.usage_percentage() > threshold * 100.0
    }

    /// Returns true if the cache is full (>=100%).
    pub fn is_full(&self) -> bool {
        self.total_bytes >= self.max_bytes
    }

    /// Bytes above the budget.
    pub fn space_needed(&self) -> u64 {
        self.total_bytes.saturating_sub(self.max_bytes)
    }

    pub fn average_entry_size(&self) -> u64 {
        if self.total_entries == 0 {
            0
        } else {
            self.total_bytes / self.total_entries as u64
        }
    }
}
