//! # Host Bridge Traits
//!
//! Capability contracts the media cache core consumes but does not implement.
//!
//! ## Overview
//!
//! The cache engine is constructed with trait objects for every external
//! collaborator, so hosts inject platform adapters and tests inject fakes.
//! No module-level shared state is involved.
//!
//! ## Traits
//!
//! ### Storage & Network
//! - [`FileStore`](storage::FileStore) - Directories, file info, small records, downloads, deletion
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and quality tier, change notifications
//!
//! ### Media Policy
//! - [`DeviceClassifier`](device::DeviceClassifier) - Performance tier and memory usage
//! - [`QualitySelector`](quality::QualitySelector) - Available encodings and recommended quality
//! - [`JobQueue`](background::JobQueue) - Non-blocking background jobs with completion callbacks
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and include the offending path or
//! URI in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across spawned maintenance tasks.

pub mod background;
pub mod device;
pub mod error;
pub mod network;
pub mod quality;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{Job, JobCallback, JobId, JobKind, JobOutcome, JobPriority, JobQueue};
pub use device::{DeviceClassifier, DeviceTier};
pub use network::{
    NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkQuality, NetworkStatus, NetworkType,
};
pub use quality::{Quality, QualitySelection, QualitySelector, SelectionContext};
pub use storage::{FileMetadata, FileStore, ProgressCallback};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
