//! Time-related abstractions.
//!
//! `Instant` is monotonic and suitable for measuring elapsed time; wall-clock
//! timestamps used by cache bookkeeping come from the injected
//! `bridge_traits::time::Clock` instead.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use tokio::time::{interval, sleep, sleep_until, timeout, Interval, MissedTickBehavior, Sleep};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Error returned by [`timeout`] when the deadline elapses.
pub use tokio::time::error::Elapsed;
