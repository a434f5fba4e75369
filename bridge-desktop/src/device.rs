//! Device Capability Implementation

use async_trait::async_trait;
use bridge_traits::{
    device::{DeviceClassifier, DeviceTier},
    error::{BridgeError, Result},
};
use std::path::PathBuf;
use tracing::debug;

/// Memory figures parsed from `/proc/meminfo`, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemorySnapshot {
    total: u64,
    available: u64,
}

impl MemorySnapshot {
    fn parse(meminfo: &str) -> Option<Self> {
        let field = |name: &str| -> Option<u64> {
            meminfo
                .lines()
                .find(|line| line.starts_with(name))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb * 1024)
        };

        Some(Self {
            total: field("MemTotal:")?,
            available: field("MemAvailable:")?,
        })
    }

    fn usage_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let used = self.total.saturating_sub(self.available);
        (used as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// Classifier backed by `/proc/meminfo`
///
/// On hosts without procfs, `performance_tier` returns the configured
/// fallback tier and `memory_usage_ratio` reports the capability as missing.
pub struct ProcMemoryClassifier {
    meminfo_path: PathBuf,
    fallback_tier: DeviceTier,
}

impl ProcMemoryClassifier {
    pub fn new() -> Self {
        Self {
            meminfo_path: PathBuf::from("/proc/meminfo"),
            fallback_tier: DeviceTier::Mid,
        }
    }

    pub fn with_fallback_tier(mut self, tier: DeviceTier) -> Self {
        self.fallback_tier = tier;
        self
    }

    pub fn with_meminfo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.meminfo_path = path.into();
        self
    }

    async fn snapshot(&self) -> Result<MemorySnapshot> {
        let contents = tokio::fs::read_to_string(&self.meminfo_path)
            .await
            .map_err(|_| BridgeError::NotAvailable("memory statistics".to_string()))?;

        MemorySnapshot::parse(&contents).ok_or_else(|| {
            BridgeError::OperationFailed(format!(
                "Unrecognised meminfo format at {:?}",
                self.meminfo_path
            ))
        })
    }
}

impl Default for ProcMemoryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceClassifier for ProcMemoryClassifier {
    async fn performance_tier(&self) -> DeviceTier {
        match self.snapshot().await {
            Ok(snapshot) => DeviceTier::from_total_memory(snapshot.total),
            Err(e) => {
                debug!(error = %e, "Falling back to static device tier");
                self.fallback_tier
            }
        }
    }

    async fn memory_usage_ratio(&self) -> Result<f64> {
        Ok(self.snapshot().await?.usage_ratio())
    }
}
