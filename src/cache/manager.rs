//! Read-through cache façade
//!
//! [`CacheManager`] owns the active backend and answers `get_or_set`: return
//! the cached value when there is one, otherwise run the caller's producer,
//! hand the result to the background writer, and return it without waiting
//! for the write.
//!
//! Cache failures never reach the caller. A broken backend only makes every
//! call a miss.

use crate::backend::{BackendKind, CacheBackend};
use crate::cache::config::CacheConfig;
use crate::cache::ttl;
use crate::cache::types::CacheStats;
use crate::cache::writer::{BackgroundWriter, StatsCounters};
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CacheManager {
    config: RwLock<CacheConfig>,
    backend: RwLock<Arc<CacheBackend>>,
    enabled: AtomicBool,
    counters: Arc<StatsCounters>,
    writer: BackgroundWriter,
}

impl CacheManager {
    /// Create a manager with the backend the configuration selects
    ///
    /// The background writer is spawned here, so this fails with
    /// [`CacheError::ConfigError`] outside a tokio runtime.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;
        let backend = CacheBackend::from_config(&config)?;
        Self::with_backend(config, backend)
    }

    /// Create a manager from environment variables (see [`CacheConfig::from_env`])
    pub fn from_env() -> Result<Self> {
        Self::new(CacheConfig::from_env()?)
    }

    /// Create a manager around an already built backend
    pub fn with_backend(config: CacheConfig, backend: CacheBackend) -> Result<Self> {
        info!(
            "Initializing cache manager ({} backend, enabled: {})",
            backend.kind(),
            config.cache_enabled
        );

        let counters = Arc::new(StatsCounters::default());
        let writer = BackgroundWriter::spawn(counters.clone())?;
        Ok(Self {
            enabled: AtomicBool::new(config.cache_enabled),
            config: RwLock::new(config),
            backend: RwLock::new(Arc::new(backend)),
            writer,
            counters,
        })
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.read().kind()
    }

    pub fn config(&self) -> CacheConfig {
        self.config.read().clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turn caching on or off without touching the backend
    pub fn set_enabled(&self, enabled: bool) {
        info!("Cache {}", if enabled { "enabled" } else { "disabled" });
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Swap in a new configuration and the backend it selects
    ///
    /// Writes already queued finish against the previous backend.
    pub fn reconfigure(&self, config: CacheConfig) -> Result<()> {
        config.validate().map_err(CacheError::ConfigError)?;
        let backend = CacheBackend::from_config(&config)?;

        info!("Reconfiguring cache ({} backend)", backend.kind());
        *self.backend.write() = Arc::new(backend);
        self.enabled.store(config.cache_enabled, Ordering::Relaxed);
        *self.config.write() = config;
        Ok(())
    }

    /// TTL for a subject last modified at `last_modified`, from the age policy
    pub fn ttl_for(&self, last_modified: Option<DateTime<Utc>>) -> u64 {
        ttl::effective_ttl(self.config.read().base_ttl_secs, last_modified)
    }

    /// Return the cached value for `key`, or compute, cache and return it
    ///
    /// The write is queued in the background; the fresh value is returned
    /// before it completes. Cached values that no longer deserialize into `T`
    /// are treated as a miss.
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, producer: F, ttl_override: Option<u64>) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(hit) = self.get(key).await {
            return hit;
        }

        let value = producer().await;
        self.populate(key, &value, ttl_override);
        value
    }

    /// Like [`CacheManager::get_or_set`] for fallible producers
    ///
    /// Producer errors are returned unchanged and nothing is cached.
    pub async fn try_get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl_override: Option<u64>,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }

        let value = producer().await?;
        self.populate(key, &value, ttl_override);
        Ok(value)
    }

    /// Read a value directly
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_enabled() {
            StatsCounters::bump(&self.counters.misses);
            return None;
        }

        let backend = self.backend.read().clone();
        let Some(raw) = backend.get(key).await else {
            StatsCounters::bump(&self.counters.misses);
            return None;
        };

        match serde_json::from_value(raw) {
            Ok(value) => {
                StatsCounters::bump(&self.counters.hits);
                Some(value)
            }
            Err(e) => {
                warn!("Cached value for {} has an unexpected shape: {}", key, e);
                StatsCounters::bump(&self.counters.misses);
                None
            }
        }
    }

    /// Write a value directly and wait for the backend
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_override: Option<u64>) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let raw = match serde_json::to_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize value for {}: {}", key, e);
                StatsCounters::bump(&self.counters.write_failures);
                return false;
            }
        };

        let backend = self.backend.read().clone();
        let ok = backend.set(key, &raw, ttl_override).await;
        StatsCounters::bump(if ok {
            &self.counters.writes
        } else {
            &self.counters.write_failures
        });
        ok
    }

    /// Remove a value, returning how many entries were deleted
    pub async fn delete(&self, key: &str) -> u64 {
        let backend = self.backend.read().clone();
        let removed = backend.delete(key).await;
        for _ in 0..removed {
            StatsCounters::bump(&self.counters.deletes);
        }
        removed
    }

    /// Wait for every queued background write to finish
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn stats(&self) -> CacheStats {
        let load = |counter: &std::sync::atomic::AtomicU64| counter.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            writes: load(&self.counters.writes),
            write_failures: load(&self.counters.write_failures),
            deletes: load(&self.counters.deletes),
        }
    }

    fn populate<T: Serialize>(&self, key: &str, value: &T, ttl_override: Option<u64>) {
        if !self.is_enabled() {
            return;
        }

        let raw = match serde_json::to_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Not caching {}: value does not serialize: {}", key, e);
                StatsCounters::bump(&self.counters.write_failures);
                return;
            }
        };

        let backend = self.backend.read().clone();
        if self.writer.submit(backend, key.to_string(), raw, ttl_override) {
            debug!("Queued background write for {}", key);
        }
    }
}
