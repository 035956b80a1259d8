//! Storage backends
//!
//! Four interchangeable stores share one contract: `get` returns the value or
//! `None`, `set` reports whether the write landed, `delete` returns the number
//! of removed entries. None of them return errors; failures are logged and
//! degrade to "nothing cached".
//!
//! The active backend is chosen once from [`CacheConfig`] by
//! [`BackendKind::select`] and held as a [`CacheBackend`] variant.

pub mod compressed;
pub mod file;
pub mod memory;
pub mod remote;

pub use compressed::{CompressedRemoteBackend, COMPRESSED_PREFIX};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use remote::RemoteBackend;

use crate::cache::config::CacheConfig;
use crate::cache::types::CacheValue;
use crate::connection::{RedisStore, RemoteStore};
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Which backend a configuration selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    File,
    Remote,
    CompressedRemote,
}

impl BackendKind {
    /// Pure selection rule
    ///
    /// Compressed remote if compression is on and a remote store is set, plain
    /// remote if only the store is set, file if requested, memory otherwise.
    pub fn select(config: &CacheConfig) -> Self {
        match (&config.remote_store_url, config.compression_enabled) {
            (Some(_), true) => BackendKind::CompressedRemote,
            (Some(_), false) => BackendKind::Remote,
            (None, _) if config.file_cache_enabled => BackendKind::File,
            (None, _) => BackendKind::Memory,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::File => write!(f, "file"),
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::CompressedRemote => write!(f, "compressed_remote"),
        }
    }
}

/// The active storage backend
pub enum CacheBackend {
    Memory(MemoryBackend),
    File(FileBackend),
    Remote(RemoteBackend),
    CompressedRemote(CompressedRemoteBackend),
}

impl CacheBackend {
    /// Build the backend a configuration selects
    ///
    /// Remote backends connect lazily, so this only fails on an invalid URL.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let kind = BackendKind::select(config);
        info!("Selected {} cache backend", kind);

        match kind {
            BackendKind::Memory => Ok(CacheBackend::Memory(MemoryBackend::new(config))),
            BackendKind::File => Ok(CacheBackend::File(FileBackend::new(
                config.file_cache_dir.clone(),
                config,
            ))),
            BackendKind::Remote | BackendKind::CompressedRemote => {
                let url = config.remote_store_url.as_deref().ok_or_else(|| {
                    CacheError::ConfigError("remote backend selected without a URL".to_string())
                })?;
                let store: Arc<dyn RemoteStore> = Arc::new(RedisStore::new(url)?);
                Ok(Self::with_store(kind, store, config))
            }
        }
    }

    /// Build a remote backend over an existing store
    ///
    /// `kind` must be [`BackendKind::Remote`] or [`BackendKind::CompressedRemote`];
    /// any other kind falls back to plain remote.
    pub fn with_store(kind: BackendKind, store: Arc<dyn RemoteStore>, config: &CacheConfig) -> Self {
        match kind {
            BackendKind::CompressedRemote => {
                CacheBackend::CompressedRemote(CompressedRemoteBackend::new(store, config))
            }
            _ => CacheBackend::Remote(RemoteBackend::new(store, config)),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            CacheBackend::Memory(_) => BackendKind::Memory,
            CacheBackend::File(_) => BackendKind::File,
            CacheBackend::Remote(_) => BackendKind::Remote,
            CacheBackend::CompressedRemote(_) => BackendKind::CompressedRemote,
        }
    }

    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        match self {
            CacheBackend::Memory(b) => b.get(key).await,
            CacheBackend::File(b) => b.get(key).await,
            CacheBackend::Remote(b) => b.get(key).await,
            CacheBackend::CompressedRemote(b) => b.get(key).await,
        }
    }

    /// Write a value; `ttl_secs` overrides the backend's default lifetime
    pub async fn set(&self, key: &str, value: &CacheValue, ttl_secs: Option<u64>) -> bool {
        match self {
            CacheBackend::Memory(b) => b.set(key, value, ttl_secs).await,
            CacheBackend::File(b) => b.set(key, value, ttl_secs).await,
            CacheBackend::Remote(b) => b.set(key, value, ttl_secs).await,
            CacheBackend::CompressedRemote(b) => b.set(key, value, ttl_secs).await,
        }
    }

    pub async fn delete(&self, key: &str) -> u64 {
        match self {
            CacheBackend::Memory(b) => b.delete(key).await,
            CacheBackend::File(b) => b.delete(key).await,
            CacheBackend::Remote(b) => b.delete(key).await,
            CacheBackend::CompressedRemote(b) => b.delete(key).await,
        }
    }
}

impl fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CacheBackend").field(&self.kind()).finish()
    }
}
