//! # Core Cache
//!
//! Client-side caching for media applications.
//!
//! ## Overview
//!
//! - [`metadata_cache`]: in-memory key/value cache bounded by entry count and
//!   total size, with per-entry TTL
//! - [`cache`]: disk-backed media file cache with adaptive quality, smart
//!   eviction, predictive preload and background maintenance
//!
//! Host capabilities (file access, downloads, network and device state,
//! quality selection, background jobs) come in through the `bridge-traits`
//! crate.

pub mod cache;
pub mod error;
pub mod metadata_cache;

pub use cache::{
    CacheEntry, CacheStats, ContentType, EvictionReport, MediaCacheConfig, MediaCacheManager,
    MediaCacheManagerBuilder, MediaSource, Priority,
};
pub use error::{CacheError, Result};
pub use metadata_cache::{BoundedCache, BoundedCacheConfig, BoundedCacheStats};
