//! Cache configuration and adaptive policies

use crate::metadata_cache::BoundedCacheConfig;
use bridge_traits::{device::DeviceTier, network::NetworkQuality, quality::Quality};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the media cache manager.
#[derive(Debug, Clone)]
pub struct MediaCacheConfig {
    /// Root directory holding `index.json`, `patterns.json` and the partitions
    pub cache_directory: PathBuf,

    /// Size budget across all cached files (default: 500MB)
    pub max_cache_size_bytes: u64,

    /// Fraction of the budget above which reads schedule an eviction sweep
    /// (default: 0.9)
    pub cleanup_threshold: f64,

    /// Fraction of the budget an eviction sweep shrinks to (default: 0.7)
    pub eviction_target_ratio: f64,

    /// Entries accessed more often than this are "popular" (default: 3)
    pub popular_access_threshold: u32,

    /// Composite eviction score weights
    pub scoring: ScoringWeights,

    /// Period of the idle cleanup task, halved on poor networks (default: 5 min)
    pub idle_cleanup_interval: Duration,

    /// Low-priority entries untouched for this long are removed by idle
    /// cleanup (default: 2 hours)
    pub stale_after: Duration,

    /// Period of the memory pressure check (default: 30s)
    pub memory_check_interval: Duration,

    /// Memory usage ratio that triggers a reduction (default: 0.8)
    pub memory_pressure_threshold: f64,

    /// Memory usage ratio that forces a reduction (default: 0.9)
    pub severe_memory_pressure_threshold: f64,

    /// Fraction of the budget kept after a memory pressure reduction
    /// (default: 0.5)
    pub memory_pressure_reduction_ratio: f64,

    /// Access timestamps remembered per entry (default: 10)
    pub pattern_history_len: usize,

    /// Smoothing factor of the access interval moving average (default: 0.3)
    pub prediction_smoothing: f64,

    /// Period of the viewing pattern flush (default: 5 min)
    pub pattern_flush_interval: Duration,

    /// Bounds of the quality selection cache
    pub selection_cache: BoundedCacheConfig,

    /// Extension used when a URI path has none (default: "mp4")
    pub default_extension: String,

    /// Extension used for thumbnails whose URI has none (default: "jpg")
    pub thumbnail_extension: String,

    /// Fetch the other qualities of a resource in the background after the
    /// primary download (default: true)
    pub queue_secondary_variants: bool,
}

impl Default for MediaCacheConfig {
    fn default() -> Self {
        Self {
            cache_directory: PathBuf::from("media_cache"),
            max_cache_size_bytes: 500 * 1024 * 1024, // 500MB
            cleanup_threshold: 0.9,
            eviction_target_ratio: 0.7,
            popular_access_threshold: 3,
            scoring: ScoringWeights::default(),
            idle_cleanup_interval: Duration::from_secs(5 * 60),
            stale_after: Duration::from_secs(2 * 60 * 60),
            memory_check_interval: Duration::from_secs(30),
            memory_pressure_threshold: 0.8,
            severe_memory_pressure_threshold: 0.9,
            memory_pressure_reduction_ratio: 0.5,
            pattern_history_len: 10,
            prediction_smoothing: 0.3,
            pattern_flush_interval: Duration::from_secs(5 * 60),
            selection_cache: BoundedCacheConfig::default()
                .with_max_entries(512)
                .with_default_ttl(Duration::from_secs(10 * 60)),
            default_extension: "mp4".to_string(),
            thumbnail_extension: "jpg".to_string(),
            queue_secondary_variants: true,
        }
    }
}

impl MediaCacheConfig {
    /// Create a configuration rooted at `cache_directory` with default values.
    pub fn new(cache_directory: impl Into<PathBuf>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            ..Self::default()
        }
    }

    /// Set the size budget.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_cache_size_bytes = bytes;
        self
    }

    pub fn with_cleanup_threshold(mut self, ratio: f64) -> Self {
        self.cleanup_threshold = ratio;
        self
    }

    pub fn with_eviction_target(mut self, ratio: f64) -> Self {
        self.eviction_target_ratio = ratio;
        self
    }

    pub fn with_popular_access_threshold(mut self, count: u32) -> Self {
        self.popular_access_threshold = count;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringWeights) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_idle_cleanup_interval(mut self, interval: Duration) -> Self {
        self.idle_cleanup_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, age: Duration) -> Self {
        self.stale_after = age;
        self
    }

    pub fn with_memory_check_interval(mut self, interval: Duration) -> Self {
        self.memory_check_interval = interval;
        self
    }

    /// Set the pressure and severe pressure thresholds.
    pub fn with_memory_pressure_thresholds(mut self, pressure: f64, severe: f64) -> Self {
        self.memory_pressure_threshold = pressure;
        self.severe_memory_pressure_threshold = severe;
        self
    }

    pub fn with_memory_pressure_reduction(mut self, ratio: f64) -> Self {
        self.memory_pressure_reduction_ratio = ratio;
        self
    }

    pub fn with_pattern_history_len(mut self, len: usize) -> Self {
        self.pattern_history_len = len;
        self
    }

    pub fn with_pattern_flush_interval(mut self, interval: Duration) -> Self {
        self.pattern_flush_interval = interval;
        self
    }

    pub fn with_selection_cache(mut self, config: BoundedCacheConfig) -> Self {
        self.selection_cache = config;
        self
    }

    pub fn with_secondary_variants(mut self, enabled: bool) -> Self {
        self.queue_secondary_variants = enabled;
        self
    }

    /// Byte count the cache schedules a sweep above.
    pub fn cleanup_trigger_bytes(&self) -> u64 {
        fraction_of(self.max_cache_size_bytes, self.cleanup_threshold)
    }

    /// Byte count an eviction sweep shrinks to.
    pub fn eviction_target_bytes(&self) -> u64 {
        fraction_of(self.max_cache_size_bytes, self.eviction_target_ratio)
    }

    /// Byte count a memory pressure reduction shrinks to.
    pub fn memory_pressure_target_bytes(&self) -> u64 {
        fraction_of(self.max_cache_size_bytes, self.memory_pressure_reduction_ratio)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_cache_size_bytes == 0 {
            return Err("max_cache_size_bytes must be greater than 0".to_string());
        }

        if self.cache_directory.as_os_str().is_empty() {
            return Err("cache_directory cannot be empty".to_string());
        }

        for (name, ratio) in [
            ("cleanup_threshold", self.cleanup_threshold),
            ("eviction_target_ratio", self.eviction_target_ratio),
            ("memory_pressure_threshold", self.memory_pressure_threshold),
            (
                "severe_memory_pressure_threshold",
                self.severe_memory_pressure_threshold,
            ),
            (
                "memory_pressure_reduction_ratio",
                self.memory_pressure_reduction_ratio,
            ),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(format!("{} must be in (0, 1], got {}", name, ratio));
            }
        }

        if self.eviction_target_ratio > self.cleanup_threshold {
            return Err("eviction_target_ratio cannot exceed cleanup_threshold".to_string());
        }

        if self.severe_memory_pressure_threshold < self.memory_pressure_threshold {
            return Err(
                "severe_memory_pressure_threshold cannot be below memory_pressure_threshold"
                    .to_string(),
            );
        }

        if !(self.prediction_smoothing > 0.0 && self.prediction_smoothing <= 1.0) {
            return Err("prediction_smoothing must be in (0, 1]".to_string());
        }

        if self.pattern_history_len < 2 {
            return Err("pattern_history_len must be at least 2".to_string());
        }

        for (name, interval) in [
            ("idle_cleanup_interval", self.idle_cleanup_interval),
            ("stale_after", self.stale_after),
            ("memory_check_interval", self.memory_check_interval),
            ("pattern_flush_interval", self.pattern_flush_interval),
        ] {
            if interval.is_zero() {
                return Err(format!("{} must be greater than 0", name));
            }
        }

        self.scoring.validate()?;
        self.selection_cache.validate()?;

        if self.default_extension.is_empty() || self.thumbnail_extension.is_empty() {
            return Err("file extensions cannot be empty".to_string());
        }

        Ok(())
    }
}

fn fraction_of(bytes: u64, ratio: f64) -> u64 {
    (bytes as f64 * ratio) as u64
}

/// Weights of the composite eviction score.
///
/// `score = frequency * (count / max_count) + recency * (1 - age / max_age)`,
/// normalised over the candidate set. Lower scores are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub frequency: f64,
    pub recency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            frequency: 0.6,
            recency: 0.4,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), String> {
        if self.frequency < 0.0 || self.recency < 0.0 {
            return Err("scoring weights cannot be negative".to_string());
        }
        if self.frequency + self.recency <= 0.0 {
            return Err("at least one scoring weight must be positive".to_string());
        }
        Ok(())
    }
}

/// Predictive preload limits for the current conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadSettings {
    /// Entries warmed per preload pass
    pub batch_size: usize,
    /// Entries warmed concurrently
    pub concurrency: usize,
    /// How far ahead a predicted access counts as due
    pub horizon: Duration,
}

impl PreloadSettings {
    pub const CONSERVATIVE: PreloadSettings = PreloadSettings {
        batch_size: 1,
        concurrency: 1,
        horizon: Duration::from_secs(30),
    };

    pub const STANDARD: PreloadSettings = PreloadSettings {
        batch_size: 3,
        concurrency: 2,
        horizon: Duration::from_secs(60),
    };

    pub const AGGRESSIVE: PreloadSettings = PreloadSettings {
        batch_size: 5,
        concurrency: 4,
        horizon: Duration::from_secs(120),
    };

    pub fn for_conditions(network: NetworkQuality, device: DeviceTier) -> Self {
        match (network, device) {
            (NetworkQuality::Poor, _) => Self::CONSERVATIVE,
            (NetworkQuality::Excellent, DeviceTier::High) => Self::AGGRESSIVE,
            _ => Self::STANDARD,
        }
    }
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Quality a read should prefer under the given conditions.
///
/// Poor networks always get `Low`. Otherwise the device tier caps the
/// quality (`Medium` on low-end devices, `High` elsewhere) and fair networks
/// are further capped at `Medium`.
pub fn preferred_quality(network: NetworkQuality, device: DeviceTier) -> Quality {
    let device_cap = match device {
        DeviceTier::Low => Quality::Medium,
        DeviceTier::Mid | DeviceTier::High => Quality::High,
    };

    match network {
        NetworkQuality::Poor => Quality::Low,
        NetworkQuality::Fair => device_cap.min(Quality::Medium),
        NetworkQuality::Good | NetworkQuality::Excellent => device_cap,
    }
}
