//! Synchronization primitives.
//!
//! Async-aware locks never block the executor, so a guard may be held across
//! an `.await` when needed. Cache code still releases guards before calling
//! into bridge I/O.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::Mutex;
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     *mutex.lock().await += 1;
//!
//!     // A busy lock is reported instead of awaited.
//!     let guard = mutex.lock().await;
//!     assert!(mutex.try_lock().is_err());
//!     drop(guard);
//! }
//! ```

pub use tokio::sync::{
    mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard, RwLockWriteGuard,
    Semaphore, SemaphorePermit, TryLockError,
};
