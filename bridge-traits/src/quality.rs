//! Quality-Variant Selection Abstraction
//!
//! A logical media resource may exist in several encodings. The selector knows
//! which encodings exist and recommends one for the current device/network.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::device::DeviceTier;
use crate::error::Result;
use crate::network::NetworkQuality;

/// Encoded resolution/bitrate tier of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    pub const ALL: [Quality; 3] = [Quality::Low, Quality::Medium, Quality::High];

    /// Label used in file names (`<key>_<label>.<ext>`).
    pub fn label(&self) -> &'static str {
        match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "low" => Some(Quality::Low),
            "medium" => Some(Quality::Medium),
            "high" => Some(Quality::High),
            _ => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Conditions the selector may take into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionContext {
    pub device_tier: DeviceTier,
    pub network_quality: NetworkQuality,
}

/// Selector answer for one logical resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualitySelection {
    /// Available encodings, ordered as the selector prefers them
    pub variants: Vec<(Quality, String)>,
    /// Recommended quality for the current conditions
    pub target: Quality,
    /// Quality to retry with when the target cannot be fetched
    pub fallback: Option<Quality>,
}

impl QualitySelection {
    /// Selection for a resource that only exists in one encoding.
    pub fn single(quality: Quality, uri: impl Into<String>) -> Self {
        Self {
            variants: vec![(quality, uri.into())],
            target: quality,
            fallback: None,
        }
    }

    pub fn uri_for(&self, quality: Quality) -> Option<&str> {
        self.variants
            .iter()
            .find(|(q, _)| *q == quality)
            .map(|(_, uri)| uri.as_str())
    }

    /// Highest available quality strictly below `quality`.
    pub fn lower_than(&self, quality: Quality) -> Option<Quality> {
        self.variants
            .iter()
            .map(|(q, _)| *q)
            .filter(|q| *q < quality)
            .max()
    }
}

/// Quality-variant selector trait
#[async_trait::async_trait]
pub trait QualitySelector: Send + Sync {
    /// List variants and recommend a target for `logical_id`
    async fn select(&self, logical_id: &str, context: &SelectionContext) -> Result<QualitySelection>;
}
