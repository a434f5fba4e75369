//! Shared fakes for the cache integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::background::{Job, JobCallback, JobId, JobKind, JobOutcome, JobPriority, JobQueue};
use bridge_traits::device::{DeviceClassifier, DeviceTier};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::network::{
    NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkQuality, NetworkStatus, NetworkType,
};
use bridge_traits::quality::{Quality, QualitySelection, QualitySelector, SelectionContext};
use bridge_traits::storage::{FileMetadata, FileStore, ProgressCallback};
use bridge_traits::time::ManualClock;
use core_async::time::{sleep, Duration};
use core_cache::{MediaCacheConfig, MediaCacheManager};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const MB: u64 = 1024 * 1024;

/// Start of every test clock: 2023-11-14T22:13:20Z.
pub const T0: i64 = 1_700_000_000_000;

// ============================================================================
// File store
// ============================================================================

/// In-memory file store. Remote resources are registered with a size and
/// "downloading" one writes that many bytes.
#[derive(Default)]
pub struct MemoryFileStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    remote: Mutex<HashMap<String, u64>>,
    failing: Mutex<HashSet<String>>,
    downloads: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    broken_reads: Mutex<bool>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, uri: &str, size: u64) {
        self.remote.lock().unwrap().insert(uri.to_string(), size);
    }

    pub fn fail(&self, uri: &str) {
        self.failing.lock().unwrap().insert(uri.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Make every `read_to_string` fail with an I/O error.
    pub fn break_reads(&self) {
        *self.broken_reads.lock().unwrap() = true;
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }

    pub fn downloads_of(&self, uri: &str) -> usize {
        self.downloads
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == uri)
            .count()
    }

    pub fn has_file(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    /// Delete behind the cache's back.
    pub fn remove_file(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    /// Files held, excluding the JSON records.
    pub fn media_file_count(&self) -> usize {
        self.files
            .lock()
            .unwrap()
            .keys()
            .filter(|p| p.extension().map_or(true, |ext| ext != "json"))
            .count()
    }

    pub fn put(&self, path: &Path, contents: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.as_bytes().to_vec());
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.has_file(path))
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let files = self.files.lock().unwrap();
        let contents = files
            .get(path)
            .ok_or_else(|| BridgeError::NotFound(path.to_path_buf()))?;
        Ok(FileMetadata {
            size: contents.len() as u64,
            modified_at: None,
            is_directory: false,
        })
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        if *self.broken_reads.lock().unwrap() {
            return Err(BridgeError::OperationFailed("disk unreadable".to_string()));
        }
        let files = self.files.lock().unwrap();
        let contents = files
            .get(path)
            .ok_or_else(|| BridgeError::NotFound(path.to_path_buf()))?;
        String::from_utf8(contents.clone())
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))
    }

    async fn write_string(&self, path: &Path, contents: &str) -> Result<()> {
        self.put(path, contents);
        Ok(())
    }

    async fn download(
        &self,
        uri: &str,
        destination: &Path,
        _progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        self.downloads.lock().unwrap().push(uri.to_string());

        if self.failing.lock().unwrap().contains(uri) {
            return Err(BridgeError::DownloadFailed {
                uri: uri.to_string(),
                message: "connection reset".to_string(),
            });
        }
        let size = self.remote.lock().unwrap().get(uri).copied().ok_or_else(|| {
            BridgeError::DownloadFailed {
                uri: uri.to_string(),
                message: "404 Not Found".to_string(),
            }
        })?;

        self.files
            .lock()
            .unwrap()
            .insert(destination.to_path_buf(), vec![0u8; size as usize]);
        Ok(size)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

// ============================================================================
// Network and device
// ============================================================================

pub fn network_info(quality: NetworkQuality) -> NetworkInfo {
    let downlink = match quality {
        NetworkQuality::Poor => 1.0,
        NetworkQuality::Fair => 3.0,
        NetworkQuality::Good => 10.0,
        NetworkQuality::Excellent => 50.0,
    };
    NetworkInfo {
        status: NetworkStatus::Connected,
        network_type: Some(NetworkType::WiFi),
        is_metered: false,
        downlink_mbps: Some(downlink),
    }
}

pub struct StaticNetwork {
    info: Mutex<NetworkInfo>,
}

impl StaticNetwork {
    pub fn new(quality: NetworkQuality) -> Self {
        Self {
            info: Mutex::new(network_info(quality)),
        }
    }

    pub fn set(&self, quality: NetworkQuality) {
        *self.info.lock().unwrap() = network_info(quality);
    }
}

#[async_trait]
impl NetworkMonitor for StaticNetwork {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(self.info.lock().unwrap().clone())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Err(BridgeError::NotAvailable(
            "change notifications".to_string(),
        ))
    }
}

pub struct StaticDevice {
    tier: DeviceTier,
    memory_usage: Mutex<f64>,
}

impl StaticDevice {
    pub fn new(tier: DeviceTier) -> Self {
        Self {
            tier,
            memory_usage: Mutex::new(0.3),
        }
    }

    pub fn set_memory_usage(&self, ratio: f64) {
        *self.memory_usage.lock().unwrap() = ratio;
    }
}

#[async_trait]
impl DeviceClassifier for StaticDevice {
    async fn performance_tier(&self) -> DeviceTier {
        self.tier
    }

    async fn memory_usage_ratio(&self) -> Result<f64> {
        Ok(*self.memory_usage.lock().unwrap())
    }
}

// ============================================================================
// Quality selection
// ============================================================================

/// Answers from a fixed table; unknown identifiers are a single `Medium`
/// encoding at the identifier itself.
#[derive(Default)]
pub struct TableSelector {
    table: Mutex<HashMap<String, QualitySelection>>,
    calls: AtomicUsize,
    broken: Mutex<bool>,
}

impl TableSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, logical_id: &str, selection: QualitySelection) {
        self.table
            .lock()
            .unwrap()
            .insert(logical_id.to_string(), selection);
    }

    pub fn break_selection(&self) {
        *self.broken.lock().unwrap() = true;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QualitySelector for TableSelector {
    async fn select(&self, logical_id: &str, _context: &SelectionContext) -> Result<QualitySelection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.broken.lock().unwrap() {
            return Err(BridgeError::OperationFailed("catalogue offline".to_string()));
        }
        Ok(self
            .table
            .lock()
            .unwrap()
            .get(logical_id)
            .cloned()
            .unwrap_or_else(|| QualitySelection::single(Quality::Medium, logical_id)))
    }
}

/// Three encodings at `<base>_<quality>.mp4`.
pub fn ladder(base: &str, target: Quality, fallback: Option<Quality>) -> QualitySelection {
    QualitySelection {
        variants: Quality::ALL
            .iter()
            .rev()
            .map(|q| (*q, format!("{}_{}.mp4", base, q.label())))
            .collect(),
        target,
        fallback,
    }
}

// ============================================================================
// Job queue
// ============================================================================

/// Holds jobs until the test runs them.
pub struct ManualJobQueue {
    store: Arc<MemoryFileStore>,
    queued: Mutex<Vec<(Job, JobCallback)>>,
}

impl ManualJobQueue {
    pub fn new(store: Arc<MemoryFileStore>) -> Self {
        Self {
            store,
            queued: Mutex::new(Vec::new()),
        }
    }

    pub fn queued(&self) -> Vec<(Quality, PathBuf)> {
        self.queued
            .lock()
            .unwrap()
            .iter()
            .map(|(job, _)| match &job.kind {
                JobKind::MaterializeVariant {
                    quality,
                    destination,
                    ..
                } => (*quality, destination.clone()),
            })
            .collect()
    }

    /// Execute every queued job and await its callback.
    pub async fn run_all(&self) -> usize {
        let jobs = std::mem::take(&mut *self.queued.lock().unwrap());
        let count = jobs.len();
        for (job, on_complete) in jobs {
            let JobKind::MaterializeVariant {
                source_uri,
                destination,
                ..
            } = job.kind;
            let outcome = match self.store.download(&source_uri, &destination, None).await {
                Ok(bytes) => JobOutcome::Completed { bytes },
                Err(e) => JobOutcome::Failed(e.to_string()),
            };
            on_complete(outcome).await;
        }
        count
    }
}

#[async_trait]
impl JobQueue for ManualJobQueue {
    async fn enqueue(
        &self,
        job: Job,
        _priority: JobPriority,
        on_complete: JobCallback,
    ) -> Result<JobId> {
        let id = job.id.clone();
        self.queued.lock().unwrap().push((job, on_complete));
        Ok(id)
    }

    async fn pending(&self) -> usize {
        self.queued.lock().unwrap().len()
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub cache: MediaCacheManager,
    pub store: Arc<MemoryFileStore>,
    pub network: Arc<StaticNetwork>,
    pub device: Arc<StaticDevice>,
    pub selector: Arc<TableSelector>,
    pub jobs: Arc<ManualJobQueue>,
    pub clock: Arc<ManualClock>,
}

pub fn config(max_bytes: u64) -> MediaCacheConfig {
    MediaCacheConfig::new("/cache").with_max_size(max_bytes)
}

pub struct HarnessBuilder {
    config: MediaCacheConfig,
    store: Arc<MemoryFileStore>,
    network: NetworkQuality,
    device: DeviceTier,
    with_jobs: bool,
}

impl HarnessBuilder {
    pub fn new(config: MediaCacheConfig) -> Self {
        Self {
            config,
            store: Arc::new(MemoryFileStore::new()),
            network: NetworkQuality::Good,
            device: DeviceTier::Mid,
            with_jobs: false,
        }
    }

    pub fn store(mut self, store: Arc<MemoryFileStore>) -> Self {
        self.store = store;
        self
    }

    pub fn network(mut self, quality: NetworkQuality) -> Self {
        self.network = quality;
        self
    }

    pub fn device(mut self, tier: DeviceTier) -> Self {
        self.device = tier;
        self
    }

    pub fn with_jobs(mut self) -> Self {
        self.with_jobs = true;
        self
    }

    /// Build and initialize.
    pub async fn start(self) -> Harness {
        let network = Arc::new(StaticNetwork::new(self.network));
        let device = Arc::new(StaticDevice::new(self.device));
        let selector = Arc::new(TableSelector::new());
        let jobs = Arc::new(ManualJobQueue::new(self.store.clone()));
        let clock = Arc::new(ManualClock::from_millis(T0));

        let mut builder = MediaCacheManager::builder(self.config)
            .file_store(self.store.clone())
            .network_monitor(network.clone())
            .device_classifier(device.clone())
            .quality_selector(selector.clone())
            .clock(clock.clone());
        if self.with_jobs {
            builder = builder.job_queue(jobs.clone());
        }

        let cache = builder.build().unwrap();
        cache.initialize().await.unwrap();

        Harness {
            cache,
            store: self.store,
            network,
            device,
            selector,
            jobs,
            clock,
        }
    }
}

/// Let spawned background work (persistence, eviction) run.
pub async fn settle() {
    for _ in 0..10 {
        core_async::task::yield_now().await;
    }
}
