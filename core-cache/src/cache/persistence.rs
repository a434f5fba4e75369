//! Index and viewing pattern persistence
//!
//! Both records are small JSON documents written through the host
//! [`FileStore`]. A missing record is an empty cache, not an error.

use crate::cache::entry::CacheEntry;
use crate::cache::key::{INDEX_FILE, PATTERNS_FILE};
use crate::error::{CacheError, Result};
use bridge_traits::error::BridgeError;
use bridge_traits::storage::FileStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Persisted form of the index: cache key to entry.
pub type IndexRecord = HashMap<String, CacheEntry>;

/// Persisted form of the viewing patterns: cache key to access timestamps.
pub type PatternRecord = HashMap<String, Vec<i64>>;

/// Reads and writes the cache's JSON records under its root directory.
pub struct CacheStore {
    fs: Arc<dyn FileStore>,
    root: PathBuf,
}

impl CacheStore {
    pub fn new(fs: Arc<dyn FileStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn patterns_path(&self) -> PathBuf {
        self.root.join(PATTERNS_FILE)
    }

    pub async fn load_index(&self) -> Result<IndexRecord> {
        self.load(&self.index_path()).await
    }

    pub async fn save_index(&self, index: &IndexRecord) -> Result<()> {
        self.save(&self.index_path(), index).await
    }

    pub async fn load_patterns(&self) -> Result<PatternRecord> {
        self.load(&self.patterns_path()).await
    }

    pub async fn save_patterns(&self, patterns: &PatternRecord) -> Result<()> {
        self.save(&self.patterns_path(), patterns).await
    }

    async fn load<T>(&self, path: &Path) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let contents = match self.fs.read_to_string(path).await {
            Ok(contents) => contents,
            Err(BridgeError::NotFound(_)) => {
                debug!(path = ?path, "No persisted record, starting empty");
                return Ok(T::default());
            }
            Err(e) => {
                return Err(CacheError::Persistence(format!(
                    "Failed to read {:?}: {}",
                    path, e
                )))
            }
        };

        if contents.trim().is_empty() {
            return Ok(T::default());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    async fn save<T>(&self, path: &Path, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;
        self.fs.write_string(path, &json).await.map_err(|e| {
            CacheError::Persistence(format!("Failed to write {:?}: {}", path, e))
        })?;
        debug!(path = ?path, bytes = json.len(), "Persisted record");
        Ok(())
    }
}
