//! Device Capability Abstraction
//!
//! Reports a coarse performance tier (derived primarily from memory) and the
//! current memory usage ratio sampled by the cache's memory-pressure monitor.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Coarse device performance classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTier {
    Low,
    Mid,
    High,
}

impl DeviceTier {
    const GIB: u64 = 1024 * 1024 * 1024;

    /// Classify from total physical memory.
    ///
    /// Below 3 GiB is `Low`, below 6 GiB is `Mid`, anything larger is `High`.
    pub fn from_total_memory(total_bytes: u64) -> Self {
        if total_bytes < 3 * Self::GIB {
            DeviceTier::Low
        } else if total_bytes < 6 * Self::GIB {
            DeviceTier::Mid
        } else {
            DeviceTier::High
        }
    }
}

/// Device capability classifier
///
/// # Platform Support
///
/// - **Desktop**: `/proc/meminfo` on Linux, static tier elsewhere
/// - **iOS/Android**: host-provided memory statistics
#[async_trait::async_trait]
pub trait DeviceClassifier: Send + Sync {
    /// Current performance tier
    async fn performance_tier(&self) -> DeviceTier;

    /// Fraction of physical memory in use, in `[0.0, 1.0]`
    async fn memory_usage_ratio(&self) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_memory() {
        assert_eq!(DeviceTier::from_total_memory(2 * DeviceTier::GIB), DeviceTier::Low);
        assert_eq!(DeviceTier::from_total_memory(4 * DeviceTier::GIB), DeviceTier::Mid);
        assert_eq!(DeviceTier::from_total_memory(16 * DeviceTier::GIB), DeviceTier::High);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(DeviceTier::High > DeviceTier::Mid);
        assert!(DeviceTier::Mid > DeviceTier::Low);
    }
}
