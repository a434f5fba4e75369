//! Media Cache Manager
//!
//! Owns the on-disk cache: the index, the viewing patterns, the selection
//! cache and the background maintenance tasks. All public operations are safe
//! to call concurrently from any task.
//!
//! Lock order, when more than one is held: `in_flight` before `index`.
//! File I/O never happens while `index` is held.

use crate::cache::config::{preferred_quality, MediaCacheConfig, PreloadSettings};
use crate::cache::entry::{CacheEntry, CacheIndex, ContentType, MediaSource, Priority, VariantFile};
use crate::cache::eviction::{self, AppliedEviction, EvictionContext, EvictionMode, EvictionReport};
use crate::cache::key::{cache_key, extension_for, media_path, partition_dirs, variant_path};
use crate::cache::maintenance;
use crate::cache::patterns::PatternStore;
use crate::cache::persistence::{CacheStore, IndexRecord, PatternRecord};
use crate::cache::stats::CacheStats;
use crate::error::{CacheError, Result};
use crate::metadata_cache::BoundedCache;
use bridge_traits::{
    background::{Job, JobCallback, JobOutcome, JobPriority, JobQueue},
    device::{DeviceClassifier, DeviceTier},
    network::{NetworkInfo, NetworkMonitor, NetworkQuality},
    quality::{Quality, QualitySelection, QualitySelector, SelectionContext},
    storage::FileStore,
    time::{Clock, SystemClock},
};
use core_async::sync::{watch, Mutex, RwLock};
use core_async::task::JoinHandle;
use core_async::time::Duration;
use core_runtime::logging::{redact_uri, strip_path};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, instrument, warn};

type InFlight = Shared<BoxFuture<'static, MediaSource>>;

/// Device and network conditions the cache is currently adapted to.
#[derive(Debug, Clone, Copy)]
struct Conditions {
    network: NetworkQuality,
    device: DeviceTier,
    preload: PreloadSettings,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            network: NetworkQuality::Fair,
            device: DeviceTier::Mid,
            preload: PreloadSettings::STANDARD,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    hits: AtomicU64,
    downloads: AtomicU64,
    pass_throughs: AtomicU64,
    evictions: AtomicU64,
    sweeps: AtomicU64,
    self_heals: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

struct Inner {
    config: MediaCacheConfig,
    store: CacheStore,
    fs: Arc<dyn FileStore>,
    network: Arc<dyn NetworkMonitor>,
    device: Arc<dyn DeviceClassifier>,
    selector: Arc<dyn QualitySelector>,
    jobs: Option<Arc<dyn JobQueue>>,
    clock: Arc<dyn Clock>,

    index: Mutex<CacheIndex>,
    patterns: Mutex<PatternStore>,
    selections: Mutex<BoundedCache<String, QualitySelection>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    pending_variants: Mutex<HashSet<(String, Quality)>>,
    eviction_lock: Mutex<()>,
    persist_lock: Mutex<()>,
    conditions: RwLock<Conditions>,

    counters: Counters,
    initialized: AtomicBool,
    memory_only: AtomicBool,
    persist_pending: AtomicBool,
    /// Resident size at which the last background sweep freed nothing
    stalled_at: AtomicU64,

    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Disk-backed cache of remote media files.
///
/// Cheap to clone; clones share the same cache.
///
/// # Example
///
/// ```ignore
/// let cache = MediaCacheManager::builder(MediaCacheConfig::new("/var/cache/media"))
///     .file_store(Arc::new(TokioFileStore::new()))
///     .network_monitor(Arc::new(DesktopNetworkMonitor::new()))
///     .device_classifier(Arc::new(ProcMemoryClassifier::new()))
///     .quality_selector(selector)
///     .build()?;
///
/// cache.initialize().await?;
/// cache.start().await;
///
/// match cache.materialize("https://cdn.example.com/v/1.mp4", Priority::High).await {
///     MediaSource::Cached(path) => play_file(path),
///     MediaSource::Remote(uri) => stream(uri),
/// }
/// ```
#[derive(Clone)]
pub struct MediaCacheManager {
    inner: Arc<Inner>,
}

/// Handle held by background tasks so they never keep the cache alive.
#[derive(Clone)]
pub(crate) struct WeakManager(Weak<Inner>);

impl WeakManager {
    pub(crate) fn upgrade(&self) -> Option<MediaCacheManager> {
        self.0.upgrade().map(|inner| MediaCacheManager { inner })
    }
}

/// Builder wiring the host capabilities into a [`MediaCacheManager`].
///
/// File store, network monitor, device classifier and quality selector are
/// required. The job queue is optional; without it no secondary variants are
/// fetched. The clock defaults to [`SystemClock`].
pub struct MediaCacheManagerBuilder {
    config: MediaCacheConfig,
    file_store: Option<Arc<dyn FileStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    device_classifier: Option<Arc<dyn DeviceClassifier>>,
    quality_selector: Option<Arc<dyn QualitySelector>>,
    job_queue: Option<Arc<dyn JobQueue>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MediaCacheManagerBuilder {
    pub fn file_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.file_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn device_classifier(mut self, classifier: Arc<dyn DeviceClassifier>) -> Self {
        self.device_classifier = Some(classifier);
        self
    }

    pub fn quality_selector(mut self, selector: Arc<dyn QualitySelector>) -> Self {
        self.quality_selector = Some(selector);
        self
    }

    pub fn job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.job_queue = Some(queue);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<MediaCacheManager> {
        self.config
            .validate()
            .map_err(|e| CacheError::Configuration(format!("Invalid cache configuration: {}", e)))?;

        let fs = self
            .file_store
            .ok_or_else(|| CacheError::capability_missing("FileStore"))?;
        let network = self
            .network_monitor
            .ok_or_else(|| CacheError::capability_missing("NetworkMonitor"))?;
        let device = self
            .device_classifier
            .ok_or_else(|| CacheError::capability_missing("DeviceClassifier"))?;
        let selector = self
            .quality_selector
            .ok_or_else(|| CacheError::capability_missing("QualitySelector"))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let selections = BoundedCache::new(self.config.selection_cache.clone(), selection_size)?
            .with_clock(clock.clone());
        let patterns = PatternStore::new(
            self.config.pattern_history_len,
            self.config.prediction_smoothing,
        );
        let store = CacheStore::new(fs.clone(), self.config.cache_directory.clone());
        let (shutdown, _) = watch::channel(false);

        Ok(MediaCacheManager {
            inner: Arc::new(Inner {
                config: self.config,
                store,
                fs,
                network,
                device,
                selector,
                jobs: self.job_queue,
                clock,
                index: Mutex::new(CacheIndex::new()),
                patterns: Mutex::new(patterns),
                selections: Mutex::new(selections),
                in_flight: Mutex::new(HashMap::new()),
                pending_variants: Mutex::new(HashSet::new()),
                eviction_lock: Mutex::new(()),
                persist_lock: Mutex::new(()),
                conditions: RwLock::new(Conditions::default()),
                counters: Counters::default(),
                initialized: AtomicBool::new(false),
                memory_only: AtomicBool::new(false),
                persist_pending: AtomicBool::new(false),
                stalled_at: AtomicU64::new(0),
                shutdown,
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }
}

/// Approximate footprint of a cached selection.
fn selection_size(selection: &QualitySelection) -> u64 {
    let uris: usize = selection.variants.iter().map(|(_, uri)| uri.len()).sum();
    (uris + 16 * selection.variants.len()) as u64
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl MediaCacheManager {
    pub fn builder(config: MediaCacheConfig) -> MediaCacheManagerBuilder {
        MediaCacheManagerBuilder {
            config,
            file_store: None,
            network_monitor: None,
            device_classifier: None,
            quality_selector: None,
            job_queue: None,
            clock: None,
        }
    }

    pub fn config(&self) -> &MediaCacheConfig {
        &self.inner.config
    }

    fn now(&self) -> i64 {
        self.inner.clock.unix_timestamp_millis()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create the directory layout, load persisted state and sample the
    /// current conditions.
    ///
    /// Failing to create directories is an error. Failing to load the records
    /// is not: the cache continues with an empty index and stops persisting
    /// for the rest of the session.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let root = &self.inner.config.cache_directory;
        info!(root = ?root, "Initializing media cache");

        self.inner.fs.create_dir_all(root).await?;
        for dir in partition_dirs() {
            self.inner.fs.create_dir_all(&root.join(dir)).await?;
        }

        match self.load_records().await {
            Ok((entries, history)) => {
                let loaded = entries.len();
                let mut index = self.inner.index.lock().await;
                for (key, entry) in entries {
                    if !index.contains(&key) {
                        index.insert(key, entry);
                    }
                }
                info!(
                    entries = loaded,
                    bytes = index.total_size(),
                    "Loaded cache index"
                );
                drop(index);

                *self.inner.patterns.lock().await = PatternStore::from_snapshot(
                    history,
                    self.inner.config.pattern_history_len,
                    self.inner.config.prediction_smoothing,
                );
                self.inner.memory_only.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                error!(error = %e, "Failed to load cache records; continuing in memory-only mode");
                self.inner.memory_only.store(true, Ordering::Relaxed);
            }
        }

        self.inner.initialized.store(true, Ordering::Release);
        self.refresh_conditions().await;
        Ok(())
    }

    async fn load_records(&self) -> Result<(IndexRecord, PatternRecord)> {
        let entries = self.inner.store.load_index().await?;
        let history = self.inner.store.load_patterns().await?;
        Ok((entries, history))
    }

    /// Spawn the maintenance tasks. Does nothing if they are running.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Cache maintenance already running");
            return;
        }

        self.inner.shutdown.send_replace(false);
        *tasks = maintenance::spawn(self);
        info!(tasks = tasks.len(), "Started cache maintenance");
    }

    /// Stop the maintenance tasks, wait for them and flush persisted state.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown.send_replace(true);

        let tasks = std::mem::take(&mut *self.inner.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }

        self.flush().await?;
        info!("Media cache shut down");
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> WeakManager {
        WeakManager(Arc::downgrade(&self.inner))
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub(crate) fn network_monitor(&self) -> Arc<dyn NetworkMonitor> {
        self.inner.network.clone()
    }

    // ------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------

    /// Re-sample device tier and network quality.
    pub async fn refresh_conditions(&self) {
        let device = self.inner.device.performance_tier().await;
        let network = match self.inner.network.get_network_info().await {
            Ok(info) => info.quality(),
            Err(e) => {
                warn!(error = %e, "Network info unavailable, keeping previous quality");
                self.network_quality().await
            }
        };
        self.apply_conditions(network, device).await;
    }

    /// Adapt to a reported network change. Returns whether the tier changed.
    pub async fn apply_network_info(&self, info: &NetworkInfo) -> bool {
        let device = self.inner.conditions.read().await.device;
        self.apply_conditions(info.quality(), device).await
    }

    async fn apply_conditions(&self, network: NetworkQuality, device: DeviceTier) -> bool {
        let mut conditions = self.inner.conditions.write().await;
        let changed = conditions.network != network || conditions.device != device;
        conditions.network = network;
        conditions.device = device;
        conditions.preload = PreloadSettings::for_conditions(network, device);
        let preload = conditions.preload;
        drop(conditions);

        if changed {
            self.inner.selections.lock().await.clear();
            info!(
                network = ?network,
                device = ?device,
                preload_batch = preload.batch_size,
                "Adapted cache to conditions"
            );
        }
        changed
    }

    pub async fn network_quality(&self) -> NetworkQuality {
        self.inner.conditions.read().await.network
    }

    pub async fn device_tier(&self) -> DeviceTier {
        self.inner.conditions.read().await.device
    }

    pub async fn preload_settings(&self) -> PreloadSettings {
        self.inner.conditions.read().await.preload
    }

    /// Quality the cache serves for the current conditions.
    pub async fn preferred_quality(&self) -> Quality {
        let conditions = *self.inner.conditions.read().await;
        preferred_quality(conditions.network, conditions.device)
    }

    /// Idle cleanup period, halved on a poor network.
    pub(crate) async fn idle_cleanup_period(&self) -> Duration {
        let period = self.inner.config.idle_cleanup_interval;
        if self.network_quality().await.is_poor() {
            period / 2
        } else {
            period
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Local path for a cached resource, or `None` on a miss.
    ///
    /// A hit counts an access, reasserts `priority` and updates the viewing
    /// pattern. If the indexed file has disappeared the entry is purged and
    /// the lookup is a miss.
    #[instrument(skip(self, logical_id), fields(uri = %redact_uri(logical_id)))]
    pub async fn lookup(&self, logical_id: &str, priority: Priority) -> Option<PathBuf> {
        Counters::bump(&self.inner.counters.requests, 1);
        self.read_entry(&cache_key(logical_id), priority).await
    }

    async fn read_entry(&self, key: &str, priority: Priority) -> Option<PathBuf> {
        let key = key.to_string();
        let (primary, variants, previous_priority) = {
            let index = self.inner.index.lock().await;
            let entry = index.get(&key)?;
            (
                entry.local_path.clone(),
                entry.variant_uris.clone(),
                entry.priority,
            )
        };

        if !self.file_present(&primary).await {
            warn!(
                key = %key,
                file = %strip_path(&primary.to_string_lossy()),
                "Cached file missing, purging entry"
            );
            self.self_heal(&key).await;
            return None;
        }

        Counters::bump(&self.inner.counters.hits, 1);
        self.record_access(&key, priority).await;
        if previous_priority != priority {
            self.inner.stalled_at.store(0, Ordering::Relaxed);
        }

        let preferred = self.preferred_quality().await;
        let path = match variants.get(&preferred) {
            Some(variant) => {
                if self.file_present(&variant.path).await {
                    variant.path.clone()
                } else {
                    debug!(key = %key, quality = %preferred, "Variant file missing, serving primary");
                    self.drop_variant(&key, preferred).await;
                    primary
                }
            }
            None => primary,
        };

        debug!(key = %key, "Cache hit");
        self.persist_in_background();
        self.schedule_eviction_if_needed().await;
        Some(path)
    }

    async fn record_access(&self, key: &str, priority: Priority) {
        let now = self.now();
        let predicted = self.inner.patterns.lock().await.record(key, now);
        self.inner
            .index
            .lock()
            .await
            .record_access(key, priority, now, predicted);
    }

    /// Whether the resource is indexed. No bookkeeping, no file check.
    pub async fn contains(&self, logical_id: &str) -> bool {
        self.inner.index.lock().await.contains(&cache_key(logical_id))
    }

    /// Bytes held, primary files plus variants.
    pub async fn current_size(&self) -> u64 {
        self.inner.index.lock().await.total_size()
    }

    pub async fn stats(&self) -> CacheStats {
        let mut stats = {
            let index = self.inner.index.lock().await;
            let mut stats = CacheStats {
                total_entries: index.len(),
                total_bytes: index.total_size(),
                ..CacheStats::default()
            };
            for (_, entry) in index.iter() {
                stats.variant_files += entry.variant_uris.len();
                match entry.priority {
                    Priority::High => stats.high_priority_entries += 1,
                    Priority::Normal => stats.normal_priority_entries += 1,
                    Priority::Low => stats.low_priority_entries += 1,
                }
            }
            stats
        };

        let counters = &self.inner.counters;
        stats.max_bytes = self.inner.config.max_cache_size_bytes;
        stats.requests = counters.requests.load(Ordering::Relaxed);
        stats.hits = counters.hits.load(Ordering::Relaxed);
        stats.downloads = counters.downloads.load(Ordering::Relaxed);
        stats.pass_throughs = counters.pass_throughs.load(Ordering::Relaxed);
        stats.evictions = counters.evictions.load(Ordering::Relaxed);
        stats.eviction_sweeps = counters.sweeps.load(Ordering::Relaxed);
        stats.self_heals = counters.self_heals.load(Ordering::Relaxed);
        stats.network_quality = Some(self.network_quality().await);
        stats.memory_only = self.inner.memory_only.load(Ordering::Relaxed);
        stats.calculated_at = self.now();
        stats
    }

    // ------------------------------------------------------------------
    // Materialisation
    // ------------------------------------------------------------------

    /// Ensure the resource is cached, downloading it if needed.
    ///
    /// Never fails: when nothing can be cached the caller gets its original
    /// identifier back as [`MediaSource::Remote`].
    pub async fn materialize(&self, logical_id: &str, priority: Priority) -> MediaSource {
        self.materialize_with(logical_id, priority, None).await
    }

    /// Like [`MediaCacheManager::materialize`], storing the file in the
    /// partition for `content_type`.
    pub async fn materialize_content(
        &self,
        logical_id: &str,
        priority: Priority,
        content_type: ContentType,
    ) -> MediaSource {
        self.materialize_with(logical_id, priority, Some(content_type))
            .await
    }

    #[instrument(skip(self, logical_id), fields(uri = %redact_uri(logical_id)))]
    async fn materialize_with(
        &self,
        logical_id: &str,
        priority: Priority,
        content_type: Option<ContentType>,
    ) -> MediaSource {
        if let Some(path) = self.lookup(logical_id, priority).await {
            return MediaSource::Cached(path);
        }

        let key = cache_key(logical_id);
        let mut joined = false;
        let download = {
            let mut in_flight = self.inner.in_flight.lock().await;
            if let Some(pending) = in_flight.get(&key) {
                debug!(key = %key, "Joining in-flight download");
                joined = true;
                Some(pending.clone())
            } else if self.inner.index.lock().await.contains(&key) {
                // Finished between our lookup and taking the lock.
                None
            } else {
                let this = self.clone();
                let id = logical_id.to_string();
                let owned_key = key.clone();
                let fut: InFlight = async move {
                    let source = this
                        .fetch_and_insert(&id, &owned_key, priority, content_type)
                        .await;
                    this.inner.in_flight.lock().await.remove(&owned_key);
                    source
                }
                .boxed()
                .shared();
                in_flight.insert(key.clone(), fut.clone());
                Some(fut)
            }
        };

        match download {
            Some(download) => {
                let source = download.await;
                if joined && source.is_cached() {
                    // The creator's bookkeeping used its own priority.
                    self.record_access(&key, priority).await;
                    self.inner.stalled_at.store(0, Ordering::Relaxed);
                }
                source
            }
            None => match self.read_entry(&key, priority).await {
                Some(path) => MediaSource::Cached(path),
                None => self.pass_through(logical_id),
            },
        }
    }

    async fn fetch_and_insert(
        &self,
        logical_id: &str,
        key: &str,
        priority: Priority,
        content_type: Option<ContentType>,
    ) -> MediaSource {
        let selection = match self.selection_for(logical_id).await {
            Ok(selection) => selection,
            Err(e) => {
                warn!(error = %e, "Quality selection failed, passing through");
                return self.pass_through(logical_id);
            }
        };

        let network = self.network_quality().await;
        let primary = if network.is_poor() {
            selection
                .fallback
                .filter(|q| selection.uri_for(*q).is_some())
                .or_else(|| selection.lower_than(selection.target))
                .unwrap_or(selection.target)
        } else {
            selection.target
        };

        let mut attempts = vec![primary];
        if let Some(fallback) = selection.fallback {
            if fallback != primary {
                attempts.push(fallback);
            }
        }

        for (attempt, quality) in attempts.into_iter().enumerate() {
            let Some(uri) = selection.uri_for(quality) else {
                debug!(quality = %quality, "No URI listed for quality");
                continue;
            };

            let path = self.media_path_for(key, content_type, quality, uri);
            match self.download(uri, &path).await {
                Ok(bytes) => {
                    let mut entry = CacheEntry::new(logical_id, path, bytes, priority, self.now())
                        .with_quality(quality)
                        .with_content_type(content_type);
                    entry.predicted_next_access =
                        self.inner.patterns.lock().await.record(key, entry.timestamp);

                    let source = self.insert_downloaded(key, entry).await;
                    if source.is_cached() && !network.is_poor() {
                        self.queue_secondary_variants(logical_id, key, &selection, quality)
                            .await;
                    }
                    return source;
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, quality = %quality, error = %e, "Download failed");
                }
            }
        }

        self.pass_through(logical_id)
    }

    async fn insert_downloaded(&self, key: &str, entry: CacheEntry) -> MediaSource {
        let path = entry.local_path.clone();
        let logical_id = entry.logical_id.clone();
        let bytes = entry.size_bytes;
        let quality = entry.quality;

        if bytes > self.inner.config.max_cache_size_bytes {
            warn!(key = %key, bytes, "Resource does not fit the cache budget");
            self.delete_files([path]).await;
            return self.pass_through(&logical_id);
        }

        let (replaced, total) = {
            let mut index = self.inner.index.lock().await;
            let replaced = index.insert(key.to_string(), entry);
            (replaced, index.total_size())
        };
        if let Some(old) = replaced {
            let stale: Vec<PathBuf> = old.all_paths().into_iter().filter(|p| *p != path).collect();
            self.delete_files(stale).await;
        }

        Counters::bump(&self.inner.counters.downloads, 1);
        info!(key = %key, bytes, quality = ?quality, "Cached resource");

        if total > self.inner.config.max_cache_size_bytes {
            let target = self.inner.config.eviction_target_bytes();
            self.shrink_to(target, EvictionMode::Normal, "budget", Some(key))
                .await;
        }
        self.persist_in_background();

        if self.inner.index.lock().await.contains(key) {
            MediaSource::Cached(path)
        } else {
            debug!(key = %key, "Entry removed before the download returned");
            self.pass_through(&logical_id)
        }
    }

    fn pass_through(&self, logical_id: &str) -> MediaSource {
        Counters::bump(&self.inner.counters.pass_throughs, 1);
        MediaSource::Remote(logical_id.to_string())
    }

    /// Selector answer for `logical_id`, served from the selection cache when
    /// possible.
    async fn selection_for(&self, logical_id: &str) -> Result<QualitySelection> {
        let id = logical_id.to_string();
        let cached = self.inner.selections.lock().await.get(&id).cloned();
        if let Some(selection) = cached {
            return Ok(selection);
        }

        let context = {
            let conditions = self.inner.conditions.read().await;
            SelectionContext {
                device_tier: conditions.device,
                network_quality: conditions.network,
            }
        };

        let mut selection = self.inner.selector.select(logical_id, &context).await?;
        if selection.variants.is_empty() {
            selection = QualitySelection::single(selection.target, logical_id);
        }

        self.inner
            .selections
            .lock()
            .await
            .set(id, selection.clone());
        Ok(selection)
    }

    fn media_path_for(
        &self,
        key: &str,
        content_type: Option<ContentType>,
        quality: Quality,
        uri: &str,
    ) -> PathBuf {
        let config = &self.inner.config;
        let fallback = match content_type {
            Some(ContentType::Thumbnail) => &config.thumbnail_extension,
            _ => &config.default_extension,
        };
        media_path(
            &config.cache_directory,
            key,
            content_type,
            quality,
            &extension_for(uri, fallback),
        )
    }

    async fn download(&self, uri: &str, destination: &Path) -> Result<u64> {
        debug!(
            uri = %redact_uri(uri),
            file = %strip_path(&destination.to_string_lossy()),
            "Downloading"
        );
        self.inner
            .fs
            .download(uri, destination, None)
            .await
            .map_err(|e| CacheError::Download {
                uri: redact_uri(uri).to_string(),
                message: e.to_string(),
            })
    }

    // ------------------------------------------------------------------
    // Variants
    // ------------------------------------------------------------------

    async fn queue_secondary_variants(
        &self,
        logical_id: &str,
        key: &str,
        selection: &QualitySelection,
        primary: Quality,
    ) {
        if !self.inner.config.queue_secondary_variants || self.inner.jobs.is_none() {
            return;
        }

        for (quality, uri) in &selection.variants {
            if *quality != primary {
                self.queue_variant(logical_id, key, *quality, uri).await;
            }
        }
    }

    async fn queue_variant(&self, logical_id: &str, key: &str, quality: Quality, uri: &str) -> bool {
        let Some(jobs) = self.inner.jobs.as_ref() else {
            return false;
        };

        let pending = (key.to_string(), quality);
        if !self.inner.pending_variants.lock().await.insert(pending.clone()) {
            return false;
        }

        let config = &self.inner.config;
        let destination = variant_path(
            &config.cache_directory,
            key,
            quality,
            &extension_for(uri, &config.default_extension),
        );
        let job = Job::materialize_variant(logical_id, quality, uri, destination.clone());

        let this = self.clone();
        let owned_key = key.to_string();
        let callback: JobCallback = Box::new(move |outcome: JobOutcome| {
            async move {
                this.complete_variant(&owned_key, quality, destination, outcome)
                    .await;
            }
            .boxed()
        });

        match jobs.enqueue(job, JobPriority::Low, callback).await {
            Ok(id) => {
                debug!(job_id = %id, key = %key, quality = %quality, "Queued variant");
                true
            }
            Err(e) => {
                warn!(key = %key, quality = %quality, error = %e, "Variant job rejected");
                self.inner.pending_variants.lock().await.remove(&pending);
                false
            }
        }
    }

    async fn complete_variant(
        &self,
        key: &str,
        quality: Quality,
        destination: PathBuf,
        outcome: JobOutcome,
    ) {
        self.inner
            .pending_variants
            .lock()
            .await
            .remove(&(key.to_string(), quality));

        let bytes = match outcome {
            JobOutcome::Completed { bytes } => bytes,
            JobOutcome::Failed(reason) => {
                debug!(key = %key, quality = %quality, reason = %reason, "Variant job failed");
                return;
            }
        };

        let file = VariantFile {
            path: destination.clone(),
            size_bytes: bytes,
        };
        let attached = self.inner.index.lock().await.attach_variant(key, quality, file);

        match attached {
            None => {
                debug!(key = %key, quality = %quality, "Entry gone before variant finished");
                self.delete_files([destination]).await;
            }
            Some(previous) => {
                if let Some(previous) = previous.filter(|p| p.path != destination) {
                    self.delete_files([previous.path]).await;
                }
                debug!(key = %key, quality = %quality, bytes, "Attached variant");
                self.persist_in_background();
                self.schedule_eviction_if_needed().await;
            }
        }
    }

    async fn drop_variant(&self, key: &str, quality: Quality) {
        let detached = self.inner.index.lock().await.detach_variant(key, quality);
        if let Some(variant) = detached {
            self.delete_files([variant.path]).await;
            self.persist_in_background();
        }
    }

    // ------------------------------------------------------------------
    // Removal and eviction
    // ------------------------------------------------------------------

    /// Remove one resource and its files. Returns whether it was cached.
    #[instrument(skip(self, logical_id), fields(uri = %redact_uri(logical_id)))]
    pub async fn remove(&self, logical_id: &str) -> bool {
        self.remove_keys(&[cache_key(logical_id)]).await.0 > 0
    }

    /// Remove every resource. Returns how many entries were dropped.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> usize {
        let removed = self.inner.index.lock().await.drain();
        self.inner.patterns.lock().await.clear();
        self.inner.selections.lock().await.clear();

        for entry in &removed {
            self.delete_files(entry.all_paths()).await;
        }

        self.persist_in_background();
        info!(removed = removed.len(), "Cleared media cache");
        removed.len()
    }

    /// Shrink to the eviction target using the smart eviction order.
    #[instrument(skip(self))]
    pub async fn evict(&self) -> EvictionReport {
        let target = self.inner.config.eviction_target_bytes();
        self.shrink_to(target, EvictionMode::Normal, "budget", None)
            .await
    }

    async fn shrink_to(
        &self,
        target_bytes: u64,
        mode: EvictionMode,
        reason: &'static str,
        protect: Option<&str>,
    ) -> EvictionReport {
        let Ok(_sweep) = self.inner.eviction_lock.try_lock() else {
            debug!(reason, "Eviction sweep already running");
            return EvictionReport::skipped();
        };
        Counters::bump(&self.inner.counters.sweeps, 1);

        let ctx = EvictionContext {
            target_bytes,
            mode,
            device_tier: self.device_tier().await,
            weights: self.inner.config.scoring,
            popular_access_threshold: self.inner.config.popular_access_threshold,
            now: self.now(),
            protect,
        };

        let applied = {
            let mut index = self.inner.index.lock().await;
            let steps = eviction::plan(&index, &ctx);
            eviction::apply(&mut index, steps)
        };
        self.finish_sweep(applied, reason).await
    }

    async fn strip_variants(&self) -> EvictionReport {
        let Ok(_sweep) = self.inner.eviction_lock.try_lock() else {
            return EvictionReport::skipped();
        };

        let preferred = self.preferred_quality().await;
        let applied = {
            let mut index = self.inner.index.lock().await;
            let steps = eviction::plan_variant_strip(&index, preferred);
            eviction::apply(&mut index, steps)
        };
        self.finish_sweep(applied, "variant strip").await
    }

    async fn finish_sweep(&self, applied: AppliedEviction, reason: &'static str) -> EvictionReport {
        let AppliedEviction {
            report,
            removed_keys,
            files,
        } = applied;
        if report.is_empty() {
            return report;
        }

        {
            let mut patterns = self.inner.patterns.lock().await;
            for key in &removed_keys {
                patterns.forget(key);
            }
        }
        self.delete_files(files).await;
        Counters::bump(&self.inner.counters.evictions, report.entries_evicted as u64);
        self.persist_in_background();

        info!(
            reason,
            entries = report.entries_evicted,
            variants = report.variants_pruned,
            bytes_freed = report.bytes_freed,
            "Eviction sweep finished"
        );
        report
    }

    /// Start a background sweep when above the cleanup threshold, unless one
    /// is running or the last one could not free anything at this size.
    async fn schedule_eviction_if_needed(&self) {
        let size = self.current_size().await;
        if size <= self.inner.config.cleanup_trigger_bytes()
            || self.inner.stalled_at.load(Ordering::Relaxed) == size
        {
            return;
        }
        // Held by a running sweep.
        if self.inner.eviction_lock.try_lock().is_err() {
            return;
        }

        let this = self.clone();
        core_async::spawn(async move {
            let report = this.evict().await;
            if report.is_empty() && !report.skipped {
                debug!(size, "Background sweep freed nothing");
                this.inner.stalled_at.store(size, Ordering::Relaxed);
            }
        });
    }

    /// Shed cache when host memory usage crosses the configured thresholds.
    ///
    /// Returns `None` when there is no pressure or usage is unknown. Above the
    /// severe threshold `High` priority entries become eligible and variants
    /// outside the preferred quality are dropped.
    #[instrument(skip(self))]
    pub async fn relieve_memory_pressure(&self) -> Option<EvictionReport> {
        let usage = match self.inner.device.memory_usage_ratio().await {
            Ok(usage) => usage,
            Err(e) => {
                debug!(error = %e, "Memory usage unavailable");
                return None;
            }
        };

        let config = &self.inner.config;
        if usage <= config.memory_pressure_threshold {
            return None;
        }

        let target = config.memory_pressure_target_bytes();
        if usage > config.severe_memory_pressure_threshold {
            warn!(usage, "Severe memory pressure, forcing cache reduction");
            let mut report = self
                .shrink_to(target, EvictionMode::Forced, "severe memory pressure", None)
                .await;
            report.merge(&self.strip_variants().await);
            Some(report)
        } else {
            info!(usage, "Memory pressure, reducing cache");
            Some(
                self.shrink_to(target, EvictionMode::Normal, "memory pressure", None)
                    .await,
            )
        }
    }

    /// Remove `Low` priority entries untouched for longer than the
    /// configured stale age.
    #[instrument(skip(self))]
    pub async fn cleanup_idle(&self) -> usize {
        let stale_after = duration_ms(self.inner.config.stale_after);
        let stale =
            eviction::stale_low_priority(&*self.inner.index.lock().await, self.now(), stale_after);

        let (removed, bytes) = self.remove_keys(&stale).await;
        if removed > 0 {
            Counters::bump(&self.inner.counters.evictions, removed as u64);
            info!(removed, bytes, "Removed stale low-priority entries");
        }
        removed
    }

    async fn self_heal(&self, key: &str) {
        if self.remove_keys(&[key.to_string()]).await.0 > 0 {
            Counters::bump(&self.inner.counters.self_heals, 1);
        }
    }

    /// Drop entries and their files. Returns entries and bytes removed.
    async fn remove_keys(&self, keys: &[String]) -> (usize, u64) {
        let removed: Vec<CacheEntry> = {
            let mut index = self.inner.index.lock().await;
            keys.iter().filter_map(|key| index.remove(key)).collect()
        };
        if removed.is_empty() {
            return (0, 0);
        }

        {
            let mut patterns = self.inner.patterns.lock().await;
            for key in keys {
                patterns.forget(key);
            }
        }

        let bytes = removed.iter().map(|e| e.size_bytes).sum();
        for entry in &removed {
            self.delete_files(entry.all_paths()).await;
        }
        self.persist_in_background();
        (removed.len(), bytes)
    }

    async fn delete_files(&self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            if let Err(e) = self.inner.fs.delete(&path).await {
                warn!(
                    file = %strip_path(&path.to_string_lossy()),
                    error = %e,
                    "Failed to delete cached file"
                );
            }
        }
    }

    async fn file_present(&self, path: &Path) -> bool {
        match self.inner.fs.exists(path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(error = %e, "Could not check cached file, assuming present");
                true
            }
        }
    }

    // ------------------------------------------------------------------
    // Preload
    // ------------------------------------------------------------------

    /// Warm entries whose predicted next access falls within the preload
    /// horizon. Returns how many were warmed.
    #[instrument(skip(self))]
    pub async fn preload(&self) -> usize {
        let settings = self.preload_settings().await;
        let now = self.now();
        let horizon = duration_ms(settings.horizon);

        let mut due: Vec<(i64, String)> = {
            let mut index = self.inner.index.lock().await;
            let due: Vec<(i64, String)> = index
                .iter()
                .filter_map(|(key, entry)| {
                    entry
                        .predicted_next_access
                        .filter(|at| *at >= now && *at - now <= horizon)
                        .map(|at| (at, key.clone()))
                })
                .collect();
            for (_, key) in &due {
                index.refresh(key, now);
            }
            due
        };
        if due.is_empty() {
            return 0;
        }

        due.sort();
        due.truncate(settings.batch_size);

        let warmed = stream::iter(due.into_iter().map(|(_, key)| key))
            .map(|key| async move { self.warm(&key).await })
            .buffer_unordered(settings.concurrency.max(1))
            .fold(0usize, |total, warmed| future::ready(total + usize::from(warmed)))
            .await;

        debug!(warmed, "Preload pass finished");
        warmed
    }

    /// Verify the entry's file and queue its preferred variant if missing.
    async fn warm(&self, key: &str) -> bool {
        let preferred = self.preferred_quality().await;
        let snapshot = {
            let index = self.inner.index.lock().await;
            index.get(key).map(|e| {
                (
                    e.logical_id.clone(),
                    e.local_path.clone(),
                    e.has_quality(preferred),
                )
            })
        };
        let Some((logical_id, path, has_preferred)) = snapshot else {
            return false;
        };

        if !self.file_present(&path).await {
            self.self_heal(key).await;
            return false;
        }

        if !has_preferred && !self.network_quality().await.is_poor() {
            match self.selection_for(&logical_id).await {
                Ok(selection) => {
                    if let Some(uri) = selection.uri_for(preferred) {
                        self.queue_variant(&logical_id, key, preferred, uri).await;
                    }
                }
                Err(e) => debug!(key = %key, error = %e, "No selection for preload"),
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn persistence_enabled(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire) && !self.inner.memory_only.load(Ordering::Relaxed)
    }

    /// Schedule an index write. Writes requested while one is pending are
    /// folded into it.
    fn persist_in_background(&self) {
        if !self.persistence_enabled() || self.inner.persist_pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let this = self.clone();
        core_async::spawn(async move {
            this.inner.persist_pending.store(false, Ordering::Release);
            if let Err(e) = this.persist_index().await {
                warn!(error = %e, "Failed to persist cache index");
            }
        });
    }

    async fn persist_index(&self) -> Result<()> {
        if !self.persistence_enabled() {
            return Ok(());
        }
        let _write = self.inner.persist_lock.lock().await;
        let snapshot = self.inner.index.lock().await.snapshot();
        self.inner.store.save_index(&snapshot).await
    }

    /// Write the viewing patterns if they changed since the last write.
    pub async fn flush_patterns(&self) -> Result<()> {
        if !self.persistence_enabled() {
            return Ok(());
        }
        let _write = self.inner.persist_lock.lock().await;
        let snapshot = {
            let mut patterns = self.inner.patterns.lock().await;
            if !patterns.is_dirty() {
                return Ok(());
            }
            patterns.take_snapshot()
        };

        if let Err(e) = self.inner.store.save_patterns(&snapshot).await {
            self.inner.patterns.lock().await.mark_dirty();
            return Err(e);
        }
        Ok(())
    }

    /// Write the index and viewing patterns now. A no-op in memory-only mode.
    pub async fn flush(&self) -> Result<()> {
        self.persist_index().await?;
        self.flush_patterns().await
    }
}
