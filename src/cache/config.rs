//! Configuration for the cache system

use crate::error::{CacheError, Result};
use crate::pool::PoolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the cache manager
///
/// Passed by value at construction. Hot reload goes through
/// `CacheManager::reconfigure` / `CacheManager::set_enabled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch; when false every read misses and every write is dropped
    pub cache_enabled: bool,

    /// Remote key-value store URL, e.g. `redis://localhost:6379`
    pub remote_store_url: Option<String>,

    /// Compress large payloads before sending them to the remote store
    pub compression_enabled: bool,

    /// Base time-to-live in seconds before age or namespace scaling
    pub base_ttl_secs: u64,

    /// Use the local file backend when no remote store is configured
    pub file_cache_enabled: bool,

    /// Directory for the file backend
    pub file_cache_dir: PathBuf,

    /// TTL jitter factor (0.0 - 1.0) applied to remote writes
    /// Spreads expiry of entries written together
    pub ttl_jitter: f64,

    /// Lease pool for the compressed remote backend
    pub pool: PoolConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            remote_store_url: None,
            compression_enabled: false,
            // 1 hour
            base_ttl_secs: 3600,
            file_cache_enabled: false,
            file_cache_dir: PathBuf::from(".cache/ouroboros"),
            ttl_jitter: 0.0,
            pool: PoolConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.base_ttl_secs == 0 {
            return Err("base_ttl_secs must be greater than 0".to_string());
        }

        if self.ttl_jitter < 0.0 || self.ttl_jitter > 1.0 {
            return Err("ttl_jitter must be between 0.0 and 1.0".to_string());
        }

        if let Some(url) = &self.remote_store_url {
            if url.trim().is_empty() {
                return Err("remote_store_url must not be empty when set".to_string());
            }
        }

        if self.file_cache_enabled && self.file_cache_dir.as_os_str().is_empty() {
            return Err("file_cache_dir must be set when the file cache is enabled".to_string());
        }

        self.pool.validate()
    }

    /// Apply jitter to a TTL in seconds
    pub fn ttl_with_jitter(&self, ttl_secs: u64) -> u64 {
        if self.ttl_jitter == 0.0 {
            return ttl_secs;
        }

        let base_secs = ttl_secs as f64;
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;

        (base_secs + jitter).max(1.0).round() as u64
    }

    /// Load configuration from the environment, reading `.env` first
    ///
    /// Recognised variables: `CACHE_ENABLED`, `REDIS_URL`, `CACHE_COMPRESSION`,
    /// `CACHE_BASE_TTL_SECS`, `FILE_CACHE_ENABLED`, `FILE_CACHE_DIR`,
    /// `CACHE_TTL_JITTER`, `POOL_MAX_CONNECTIONS`, `POOL_ACQUIRE_TIMEOUT_MS`,
    /// `POOL_MAX_IDLE_MS`, `POOL_SWEEP_INTERVAL_MS`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a configuration from a variable lookup, defaults for anything unset
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config = Self {
            cache_enabled: parse_var(&get, "CACHE_ENABLED", parse_bool)?
                .unwrap_or(defaults.cache_enabled),
            remote_store_url: get("REDIS_URL"),
            compression_enabled: parse_var(&get, "CACHE_COMPRESSION", parse_bool)?
                .unwrap_or(defaults.compression_enabled),
            base_ttl_secs: parse_var(&get, "CACHE_BASE_TTL_SECS", parse_from_str)?
                .unwrap_or(defaults.base_ttl_secs),
            file_cache_enabled: parse_var(&get, "FILE_CACHE_ENABLED", parse_bool)?
                .unwrap_or(defaults.file_cache_enabled),
            file_cache_dir: get("FILE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_cache_dir),
            ttl_jitter: parse_var(&get, "CACHE_TTL_JITTER", parse_from_str)?
                .unwrap_or(defaults.ttl_jitter),
            pool: PoolConfig {
                max_connections: parse_var(&get, "POOL_MAX_CONNECTIONS", parse_from_str)?
                    .unwrap_or(defaults.pool.max_connections),
                acquire_timeout: parse_var(&get, "POOL_ACQUIRE_TIMEOUT_MS", parse_from_str)?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.pool.acquire_timeout),
                max_idle_time: parse_var(&get, "POOL_MAX_IDLE_MS", parse_from_str)?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.pool.max_idle_time),
                sweep_interval: parse_var(&get, "POOL_SWEEP_INTERVAL_MS", parse_from_str)?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.pool.sweep_interval),
            },
        };

        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }
}

fn parse_var<G, T>(
    get: &G,
    name: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<Option<T>>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => parse(raw.trim())
            .map(Some)
            .ok_or_else(|| CacheError::ConfigError(format!("invalid value for {}: {:?}", name, raw))),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_from_str<T: FromStr>(raw: &str) -> Option<T> {
    raw.parse().ok()
}

/// Builder for cache configuration with validation
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    cache_enabled: Option<bool>,
    remote_store_url: Option<String>,
    compression_enabled: Option<bool>,
    base_ttl_secs: Option<u64>,
    file_cache_enabled: Option<bool>,
    file_cache_dir: Option<PathBuf>,
    ttl_jitter: Option<f64>,
    pool: Option<PoolConfig>,
}

impl CacheConfigBuilder {
    /// Enable or disable caching altogether
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    /// Set the remote store URL
    pub fn remote_store_url(mut self, url: impl Into<String>) -> Self {
        self.remote_store_url = Some(url.into());
        self
    }

    /// Enable or disable payload compression for the remote store
    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.compression_enabled = Some(enabled);
        self
    }

    /// Set the base TTL in seconds
    pub fn base_ttl_secs(mut self, secs: u64) -> Self {
        self.base_ttl_secs = Some(secs);
        self
    }

    /// Enable or disable the file backend
    pub fn file_cache_enabled(mut self, enabled: bool) -> Self {
        self.file_cache_enabled = Some(enabled);
        self
    }

    /// Set the file backend directory
    pub fn file_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_cache_dir = Some(dir.into());
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set the lease pool configuration
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            cache_enabled: self.cache_enabled.unwrap_or(defaults.cache_enabled),
            remote_store_url: self.remote_store_url.or(defaults.remote_store_url),
            compression_enabled: self
                .compression_enabled
                .unwrap_or(defaults.compression_enabled),
            base_ttl_secs: self.base_ttl_secs.unwrap_or(defaults.base_ttl_secs),
            file_cache_enabled: self
                .file_cache_enabled
                .unwrap_or(defaults.file_cache_enabled),
            file_cache_dir: self.file_cache_dir.unwrap_or(defaults.file_cache_dir),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            pool: self.pool.unwrap_or(defaults.pool),
        }
    }
}

/// Preset configurations for common deployments
impl CacheConfig {
    /// Process-local memory cache, nothing persisted
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Local file cache under `dir`
    pub fn local_files(dir: impl Into<PathBuf>) -> Self {
        Self {
            file_cache_enabled: true,
            file_cache_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Shared remote store with compression, as run in production
    pub fn shared(url: impl Into<String>) -> Self {
        Self {
            remote_store_url: Some(url.into()),
            compression_enabled: true,
            ttl_jitter: 0.10,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.base_ttl_secs, 3600);
        assert!(config.remote_store_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut invalid_config = CacheConfig::default();
        invalid_config.base_ttl_secs = 0;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.ttl_jitter = 1.5;
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.remote_store_url = Some("  ".to_string());
        assert!(invalid_config.validate().is_err());

        let mut invalid_config = CacheConfig::default();
        invalid_config.pool.max_connections = 0;
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::builder()
            .remote_store_url("redis://cache:6379")
            .compression_enabled(true)
            .base_ttl_secs(600)
            .build();

        assert_eq!(config.remote_store_url.as_deref(), Some("redis://cache:6379"));
        assert!(config.compression_enabled);
        assert_eq!(config.base_ttl_secs, 600);
        assert!(config.cache_enabled);
    }

    #[test]
    fn test_ttl_with_jitter() {
        let config = CacheConfig {
            ttl_jitter: 0.1,
            ..Default::default()
        };

        for _ in 0..50 {
            let ttl = config.ttl_with_jitter(3600);
            assert!((3240..=3960).contains(&ttl));
        }

        assert_eq!(CacheConfig::default().ttl_with_jitter(3600), 3600);
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = [
            ("CACHE_ENABLED", "false"),
            ("REDIS_URL", "redis://cache:6379"),
            ("CACHE_COMPRESSION", "yes"),
            ("CACHE_BASE_TTL_SECS", "600"),
            ("POOL_MAX_CONNECTIONS", "4"),
            ("POOL_ACQUIRE_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();

        let config = CacheConfig::from_vars(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert!(!config.cache_enabled);
        assert_eq!(config.remote_store_url.as_deref(), Some("redis://cache:6379"));
        assert!(config.compression_enabled);
        assert_eq!(config.base_ttl_secs, 600);
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.pool.max_idle_time, PoolConfig::default().max_idle_time);
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let result = CacheConfig::from_vars(|name| {
            (name == "CACHE_BASE_TTL_SECS").then(|| "ten minutes".to_string())
        });
        assert!(matches!(result, Err(CacheError::ConfigError(_))));
    }

    #[test]
    fn test_preset_configs() {
        assert!(CacheConfig::in_memory().remote_store_url.is_none());

        let files = CacheConfig::local_files("/tmp/cache");
        assert!(files.file_cache_enabled);
        assert_eq!(files.file_cache_dir, PathBuf::from("/tmp/cache"));

        let shared = CacheConfig::shared("redis://cache:6379");
        assert!(shared.compression_enabled);
        assert!(shared.validate().is_ok());
    }
}
