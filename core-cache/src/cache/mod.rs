//! # Media Cache Module
//!
//! Disk-backed cache of remote media files, adapted to the host device and
//! network.
//!
//! ## Overview
//!
//! - Content-addressed storage: the cache key is a truncated SHA-256 of the
//!   logical identifier, partitioned by content type or quality tier
//! - Download coalescing: concurrent requests for one resource share a single
//!   download
//! - Priority-aware eviction with a frequency/recency score, pruning redundant
//!   variants of popular entries before removing anything
//! - Background variant fetching through the host job queue
//! - Viewing pattern prediction and preload
//! - Memory pressure relief and idle cleanup
//! - Self-healing when indexed files disappear
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │     MediaCacheManager                  │
//! │  - lookup() / materialize()            │
//! │  - evict() / relieve_memory_pressure() │
//! │  - start() / shutdown()                │
//! └────────┬───────────────────────────────┘
//!          │
//!          ├──> CacheIndex + PatternStore (in memory)
//!          ├──> CacheStore (index.json, patterns.json)
//!          ├──> FileStore (downloads, files)
//!          ├──> QualitySelector (+ BoundedCache of selections)
//!          ├──> NetworkMonitor / DeviceClassifier
//!          └──> JobQueue (optional, secondary variants)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_cache::cache::{MediaCacheConfig, MediaCacheManager, MediaSource, Priority};
//!
//! # async fn example(cache: &MediaCacheManager) {
//! match cache.materialize("https://cdn.example.com/v/1.mp4", Priority::Normal).await {
//!     MediaSource::Cached(path) => println!("play {}", path.display()),
//!     MediaSource::Remote(uri) => println!("stream {}", uri),
//! }
//!
//! let stats = cache.stats().await;
//! println!("Cache size: {} MB", stats.total_bytes / 1_000_000);
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod eviction;
pub mod key;
mod maintenance;
pub mod manager;
pub mod patterns;
pub mod persistence;
pub mod stats;

// Re-export commonly used types
pub use config::{preferred_quality, MediaCacheConfig, PreloadSettings, ScoringWeights};
pub use entry::{CacheEntry, CacheIndex, ContentType, MediaSource, Priority, VariantFile};
pub use eviction::{EvictionMode, EvictionReport};
pub use key::cache_key;
pub use manager::{MediaCacheManager, MediaCacheManagerBuilder};
pub use stats::CacheStats;
