//! File Store Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileStore, ProgressCallback},
};
use futures_util::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Tokio-based file store
///
/// Downloads stream into a `.part` sibling of the destination and are renamed
/// into place only once complete. `file://` URIs and bare absolute paths are
/// copied instead of fetched over HTTP.
pub struct TokioFileStore {
    client: reqwest::Client,
}

impl TokioFileStore {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    fn partial_path(destination: &Path) -> PathBuf {
        let mut name = destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".part");
        destination.with_file_name(name)
    }

    fn local_source(uri: &str) -> Option<PathBuf> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        let path = Path::new(uri);
        path.is_absolute().then(|| path.to_path_buf())
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn fetch_http(
        &self,
        uri: &str,
        partial: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        let failed = |message: String| BridgeError::DownloadFailed {
            uri: uri.to_string(),
            message,
        };

        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP error: {}", response.status())));
        }

        let total = response.content_length();
        let mut file = fs::File::create(partial).await.map_err(Self::map_io_error)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            file.write_all(&chunk).await.map_err(Self::map_io_error)?;
            written += chunk.len() as u64;
            if let Some(progress) = progress.as_ref() {
                progress(written, total);
            }
        }

        file.flush().await.map_err(Self::map_io_error)?;
        Ok(written)
    }
}

impl Default for TokioFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for TokioFileStore {
    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(Self::map_io_error)?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => BridgeError::NotFound(path.to_path_buf()),
            _ => Self::map_io_error(e),
        })?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => BridgeError::NotFound(path.to_path_buf()),
            _ => Self::map_io_error(e),
        })
    }

    async fn write_string(&self, path: &Path, contents: &str) -> Result<()> {
        self.ensure_parent(path).await?;

        // Write-then-rename so a crash never leaves a truncated record.
        let partial = Self::partial_path(path);
        fs::write(&partial, contents.as_bytes())
            .await
            .map_err(Self::map_io_error)?;
        fs::rename(&partial, path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = contents.len(), "Wrote record");
        Ok(())
    }

    async fn download(
        &self,
        uri: &str,
        destination: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<u64> {
        self.ensure_parent(destination).await?;
        let partial = Self::partial_path(destination);

        let result = match Self::local_source(uri) {
            Some(source) => fs::copy(&source, &partial).await.map_err(|e| {
                BridgeError::DownloadFailed {
                    uri: uri.to_string(),
                    message: e.to_string(),
                }
            }),
            None => self.fetch_http(uri, &partial, progress).await,
        };

        match result {
            Ok(bytes) => {
                fs::rename(&partial, destination)
                    .await
                    .map_err(Self::map_io_error)?;
                debug!(path = ?destination, bytes, "Download complete");
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = ?path, "Deleted file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::map_io_error(e)),
        }
    }
}
