//! # Desktop Bridge Implementations
//!
//! Default implementations of the cache's bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileStore` using `tokio::fs` with `reqwest` streaming downloads
//! - `NetworkMonitor` using a TCP reachability probe
//! - `DeviceClassifier` using `/proc/meminfo` (static tier elsewhere)
//! - `JobQueue` using bounded Tokio tasks
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ProcMemoryClassifier, TokioFileStore, TokioJobQueue};
//! use std::sync::Arc;
//!
//! let store = Arc::new(TokioFileStore::new());
//! let jobs = Arc::new(TokioJobQueue::new(store.clone(), 2));
//! let network = Arc::new(DesktopNetworkMonitor::new());
//! let device = Arc::new(ProcMemoryClassifier::new());
//! ```

mod background;
mod device;
mod filesystem;
mod network;

pub use background::TokioJobQueue;
pub use device::ProcMemoryClassifier;
pub use filesystem::TokioFileStore;
pub use network::DesktopNetworkMonitor;
