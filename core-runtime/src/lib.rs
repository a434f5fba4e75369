//! # Core Runtime Module
//!
//! Ambient runtime infrastructure shared by the cache crates:
//! - Logging and tracing initialisation
//! - Host log forwarding through `LoggerSink`
//! - Redaction helpers for URIs and paths
//!
//! The cache engine itself only emits `tracing` events; hosts call
//! [`logging::init_logging`] once at startup to decide where they go.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
