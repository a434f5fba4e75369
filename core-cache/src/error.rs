//! # Cache Error Types

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur inside the cache crates.
///
/// The public manager operations (`lookup`, `materialize`) never surface
/// these to callers; they degrade to a miss or a pass-through instead.
#[derive(Error, Debug)]
pub enum CacheError {
    // ========================================================================
    // Construction
    // ========================================================================
    /// Invalid bounds, ratios or intervals. Fatal at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required collaborator was not supplied to the builder.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    // ========================================================================
    // I/O
    // ========================================================================
    /// Error reported by a host collaborator.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Fetching a remote resource into the cache failed.
    #[error("Download failed for {uri}: {message}")]
    Download { uri: String, message: String },

    // ========================================================================
    // Persistence
    // ========================================================================
    /// Loading or saving the index or pattern records failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Returns `true` if the failed operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Download { .. } => true,
            CacheError::Bridge(e) => e.is_transient(),
            _ => false,
        }
    }

    pub(crate) fn capability_missing(capability: &str) -> Self {
        CacheError::CapabilityMissing {
            capability: capability.to_string(),
            message: format!("{} must be supplied to the cache builder", capability),
        }
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
