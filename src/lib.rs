//! Workspace facade crate.
//!
//! Re-exports the cache and bridge crates so host applications can depend on
//! `media-cache-workspace` alone. The `desktop-shims` feature (on by default)
//! adds the desktop bridge implementations, the logging setup and
//! [`desktop::builder`], which wires them into a cache builder.

pub use bridge_traits;
pub use core_cache;

pub use core_cache::{
    CacheError, MediaCacheConfig, MediaCacheManager, MediaCacheManagerBuilder, MediaSource,
    Priority,
};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;
#[cfg(feature = "desktop-shims")]
pub use core_runtime;

#[cfg(feature = "desktop-shims")]
pub mod desktop {
    use bridge_desktop::{DesktopNetworkMonitor, ProcMemoryClassifier, TokioFileStore, TokioJobQueue};
    use bridge_traits::quality::QualitySelector;
    use core_cache::{MediaCacheConfig, MediaCacheManager, MediaCacheManagerBuilder};
    use std::sync::Arc;

    /// Concurrent background variant downloads.
    pub const VARIANT_JOB_CONCURRENCY: usize = 2;

    /// Cache builder wired with the desktop file store, network monitor,
    /// device classifier and job queue. Only the quality selector, which
    /// knows the host's media catalogue, has to be supplied.
    pub fn builder(
        config: MediaCacheConfig,
        selector: Arc<dyn QualitySelector>,
    ) -> MediaCacheManagerBuilder {
        let store = Arc::new(TokioFileStore::new());
        let jobs = Arc::new(TokioJobQueue::new(store.clone(), VARIANT_JOB_CONCURRENCY));

        MediaCacheManager::builder(config)
            .file_store(store)
            .network_monitor(Arc::new(DesktopNetworkMonitor::new()))
            .device_classifier(Arc::new(ProcMemoryClassifier::new()))
            .quality_selector(selector)
            .job_queue(jobs)
    }
}
