//! Cache entry model and in-memory index

use bridge_traits::quality::Quality;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Retention tier of an entry. Reasserted by every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Storage partition for callers that know what kind of media they fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Thumbnail,
    Preview,
    Full,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [ContentType::Thumbnail, ContentType::Preview, ContentType::Full];

    /// Partition directory name.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ContentType::Thumbnail => "thumbnail",
            ContentType::Preview => "preview",
            ContentType::Full => "full",
        }
    }
}

/// An extra encoding attached to an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Where a caller should read a resource from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Local file inside the cache
    Cached(PathBuf),
    /// The caller's original identifier, unchanged
    Remote(String),
}

impl MediaSource {
    pub fn is_cached(&self) -> bool {
        matches!(self, MediaSource::Cached(_))
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            MediaSource::Cached(path) => Some(path),
            MediaSource::Remote(_) => None,
        }
    }
}

/// One cached resource: a primary file plus any attached variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub logical_id: String,
    pub local_path: PathBuf,
    /// Primary file size plus all variant sizes
    pub size_bytes: u64,
    /// Last touch, unix ms. Refreshed by reads and by preload.
    pub timestamp: i64,
    pub access_count: u32,
    /// Last read, unix ms
    pub last_access_time: i64,
    pub priority: Priority,
    #[serde(default)]
    pub predicted_next_access: Option<i64>,
    /// Quality of the primary file, when known
    #[serde(default)]
    pub quality: Option<Quality>,
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default, with = "variant_list")]
    pub variant_uris: BTreeMap<Quality, VariantFile>,
}

impl CacheEntry {
    /// Entry for a freshly downloaded primary file, counted as one access.
    pub fn new(
        logical_id: impl Into<String>,
        local_path: PathBuf,
        size_bytes: u64,
        priority: Priority,
        now: i64,
    ) -> Self {
        Self {
            logical_id: logical_id.into(),
            local_path,
            size_bytes,
            timestamp: now,
            access_count: 1,
            last_access_time: now,
            priority,
            predicted_next_access: None,
            quality: None,
            content_type: None,
            variant_uris: BTreeMap::new(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_content_type(mut self, content_type: Option<ContentType>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Highest quality held on disk, primary included.
    pub fn best_quality(&self) -> Option<Quality> {
        self.variant_uris.keys().copied().chain(self.quality).max()
    }

    /// Whether `quality` is held on disk, primary included.
    pub fn has_quality(&self, quality: Quality) -> bool {
        self.quality == Some(quality) || self.variant_uris.contains_key(&quality)
    }

    pub fn variant_path(&self, quality: Quality) -> Option<&Path> {
        self.variant_uris.get(&quality).map(|v| v.path.as_path())
    }

    /// Primary path followed by every variant path.
    pub fn all_paths(&self) -> Vec<PathBuf> {
        std::iter::once(self.local_path.clone())
            .chain(self.variant_uris.values().map(|v| v.path.clone()))
            .collect()
    }

    pub fn is_popular(&self, threshold: u32) -> bool {
        self.access_count > threshold
    }

    /// Variants whose quality is below the best held quality.
    pub fn redundant_variants(&self) -> Vec<Quality> {
        let Some(best) = self.best_quality() else {
            return Vec::new();
        };
        self.variant_uris
            .keys()
            .copied()
            .filter(|q| *q < best)
            .collect()
    }

    fn record_access(&mut self, priority: Priority, now: i64) {
        self.timestamp = now;
        self.last_access_time = now;
        self.access_count = self.access_count.saturating_add(1);
        self.priority = priority;
    }
}

/// `variant_uris` crosses the persistence boundary as an ordered list of
/// `[quality, file]` pairs.
pub(crate) mod variant_list {
    use super::VariantFile;
    use bridge_traits::quality::Quality;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(map: &BTreeMap<Quality, VariantFile>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let pairs: Vec<(&Quality, &VariantFile)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<Quality, VariantFile>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs: Vec<(Quality, VariantFile)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

/// In-memory source of truth: cache key to entry, plus the running size.
///
/// Every mutation that changes an entry's size goes through this type so the
/// running size always equals the sum of entry sizes.
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    entries: HashMap<String, CacheEntry>,
    total_size: u64,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    /// Insert or replace, returning the replaced entry.
    pub fn insert(&mut self, key: String, entry: CacheEntry) -> Option<CacheEntry> {
        self.total_size += entry.size_bytes;
        let previous = self.entries.insert(key, entry);
        if let Some(previous) = previous.as_ref() {
            self.total_size -= previous.size_bytes;
        }
        previous
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size -= entry.size_bytes;
        Some(entry)
    }

    /// Remove every entry, returning them.
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        self.total_size = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Apply read bookkeeping. Returns `false` if the entry is gone.
    pub fn record_access(
        &mut self,
        key: &str,
        priority: Priority,
        now: i64,
        predicted_next_access: Option<i64>,
    ) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.record_access(priority, now);
                entry.predicted_next_access = predicted_next_access;
                true
            }
            None => false,
        }
    }

    /// Refresh the touch timestamp without counting an access.
    pub fn refresh(&mut self, key: &str, now: i64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.timestamp = now;
        }
    }

    /// Attach or replace a variant. Returns `None` if the entry is gone,
    /// otherwise the replaced variant (if any).
    pub fn attach_variant(
        &mut self,
        key: &str,
        quality: Quality,
        file: VariantFile,
    ) -> Option<Option<VariantFile>> {
        let entry = self.entries.get_mut(key)?;
        let added = file.size_bytes;
        let previous = entry.variant_uris.insert(quality, file);
        let removed = previous.as_ref().map_or(0, |v| v.size_bytes);

        entry.size_bytes = entry.size_bytes + added - removed;
        self.total_size = self.total_size + added - removed;
        Some(previous)
    }

    pub fn detach_variant(&mut self, key: &str, quality: Quality) -> Option<VariantFile> {
        let entry = self.entries.get_mut(key)?;
        let variant = entry.variant_uris.remove(&quality)?;
        entry.size_bytes -= variant.size_bytes;
        self.total_size -= variant.size_bytes;
        Some(variant)
    }

    /// Copy of all entries for persistence.
    pub fn snapshot(&self) -> HashMap<String, CacheEntry> {
        self.entries.clone()
    }

    /// Sum of entry sizes, computed from scratch.
    pub fn recomputed_size(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}
