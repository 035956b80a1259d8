//! Local file backend
//!
//! One JSON file per entry, named by the SHA-256 of the key so any key is a
//! safe file name. Entries survive restarts and are never expired here.

use crate::cache::config::CacheConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::types::CacheValue;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
    default_ttl_secs: u64,
}

impl FileBackend {
    /// Backend rooted at `dir`; the directory is created on first write
    ///
    /// Entries written without a TTL record the configured `base_ttl_secs`.
    pub fn new(dir: impl Into<PathBuf>, config: &CacheConfig) -> Self {
        Self {
            dir: dir.into(),
            default_ttl_secs: config.base_ttl_secs,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.read_entry(key).await {
            Ok(Some(entry)) if entry.key == key => {
                debug!("File cache hit: {}", key);
                Some(entry.value)
            }
            Ok(Some(entry)) => {
                warn!("File cache key mismatch for {} (found {})", key, entry.key);
                None
            }
            Ok(None) => {
                debug!("File cache miss: {}", key);
                None
            }
            Err(e) => {
                warn!("File cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Full entry including write time and TTL
    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.read_entry(key).await.ok().flatten()
    }

    pub async fn set(&self, key: &str, value: &CacheValue, ttl_secs: Option<u64>) -> bool {
        let entry = CacheEntry::new(
            key.to_string(),
            value.clone(),
            ttl_secs.unwrap_or(self.default_ttl_secs),
        );

        match self.write_entry(&entry).await {
            Ok(()) => {
                debug!("File cache set: {}", key);
                true
            }
            Err(e) => {
                warn!("File cache write failed for {}: {}", key, e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> u64 {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => 1,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => {
                warn!("File cache delete failed for {}: {}", key, e);
                0
            }
        }
    }

    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let bytes = match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    // Write to a sibling temp file, then rename over the target.
    async fn write_entry(&self, entry: &CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(&entry.key);
        let tmp = path.with_extension(format!("{:016x}.tmp", rand::random::<u64>()));
        let bytes = serde_json::to_vec(entry)?;

        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}
