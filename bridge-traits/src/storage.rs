//! Durable File Store Abstraction
//!
//! The cache engine never touches the filesystem directly. Everything it needs
//! (directories, file info, small text records, downloads, deletion) goes
//! through [`FileStore`] so hosts can back it with sandboxed app storage and
//! tests can back it with an in-memory map.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// Download progress callback: `(bytes_written, total_bytes_if_known)`.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Durable file store trait
///
/// # Contract
///
/// - `delete` is idempotent: deleting a missing path succeeds.
/// - `download` writes the complete resource to `destination` (creating parent
///   directories) and returns the number of bytes written. A failed download
///   must not leave a partial file at `destination`.
/// - `exists` never fails for a missing path; it returns `Ok(false)`.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileStore;
///
/// async fn fetch(store: &dyn FileStore) -> Result<u64> {
///     let dest = Path::new("/cache/full/abc.mp4");
///     store.download("https://cdn.example.com/v/abc.mp4", dest, None).await
/// }
/// ```
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Read a small UTF-8 record (index, pattern history)
    async fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Write a small UTF-8 record, replacing previous contents
    async fn write_string(&self, path: &Path, contents: &str) -> Result<()>;

    /// Download a remote resource to a local path
    async fn download(
        &self,
        uri: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64>;

    /// Delete a file; missing paths are not an error
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Size of a file in bytes
    async fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(self.metadata(path).await?.size)
    }
}
