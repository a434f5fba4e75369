//! Cache keys and on-disk layout

use crate::cache::entry::ContentType;
use bridge_traits::quality::Quality;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Index file name under the cache root.
pub const INDEX_FILE: &str = "index.json";

/// Viewing pattern file name under the cache root.
pub const PATTERNS_FILE: &str = "patterns.json";

/// Derive the cache key for a logical identifier.
///
/// First 16 hex characters (64 bits) of the SHA-256 digest. Deterministic
/// across processes. Collisions are possible in principle and not detected.
pub fn cache_key(logical_id: &str) -> String {
    let digest = Sha256::digest(logical_id.as_bytes());
    hex::encode(&digest[..8])
}

/// Partition directory name for a quality tier.
pub fn quality_dir(quality: Quality) -> &'static str {
    match quality {
        Quality::Low => "low_quality",
        Quality::Medium => "medium_quality",
        Quality::High => "high_quality",
    }
}

/// Every partition directory created by `initialize`.
pub fn partition_dirs() -> impl Iterator<Item = &'static str> {
    ContentType::ALL
        .into_iter()
        .map(|c| c.dir_name())
        .chain(Quality::ALL.into_iter().map(quality_dir))
}

/// Location of a downloaded file.
///
/// With a content type the file is `<root>/<content>/<key>.<ext>`; without
/// one it is `<root>/<quality>_quality/<key>_<quality>.<ext>`.
pub fn media_path(
    root: &Path,
    key: &str,
    content_type: Option<ContentType>,
    quality: Quality,
    extension: &str,
) -> PathBuf {
    match content_type {
        Some(content_type) => root
            .join(content_type.dir_name())
            .join(format!("{}.{}", key, extension)),
        None => variant_path(root, key, quality, extension),
    }
}

/// Location of a quality variant: always the quality partition.
pub fn variant_path(root: &Path, key: &str, quality: Quality, extension: &str) -> PathBuf {
    root.join(quality_dir(quality))
        .join(format!("{}_{}.{}", key, quality.label(), extension))
}

/// File extension of the URI's last path segment, or `fallback`.
///
/// Only short alphanumeric extensions are accepted so that query-string
/// fragments and dotted host names never leak into file names.
pub fn extension_for(uri: &str, fallback: &str) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let path = path
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map_or("", |(_, p)| p))
        .unwrap_or(path);
    let segment = path.rsplit('/').next().unwrap_or("");

    match segment.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => fallback.to_string(),
    }
}
