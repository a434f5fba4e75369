//! Async runtime facade for the media cache workspace.
//!
//! Every core-* and bridge-* crate goes through this crate instead of naming
//! Tokio directly, so the executor can be swapped in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and join handles
//! - `time`: Sleep, timeouts, intervals and instants
//! - `sync`: Async-aware locks and channels
//! - `runtime`: Blocking entry point used by the test/main attributes
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Multiplexing over shutdown signals and timers.
pub use tokio::select;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
