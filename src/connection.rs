//! Remote key-value store connection
//!
//! The remote backends talk to the store through the [`RemoteStore`] trait.
//! [`RedisStore`] is the production implementation: a single multiplexed
//! connection, opened lazily on the first command and shared by every caller.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Minimal command surface the cache needs from a remote store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the text stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl_secs`
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Delete `key`, returning how many entries were removed
    async fn del(&self, key: &str) -> Result<u64>;

    /// Round-trip check, returns the observed latency
    async fn ping(&self) -> Result<Duration>;
}

/// Redis-backed [`RemoteStore`]
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Create a store for the given URL (e.g. `redis://localhost:6379`)
    ///
    /// Only the URL is validated here; the connection is opened on first use.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::ConfigError(format!("invalid redis url: {}", e)))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
        })
    }

    /// Whether the shared connection has been opened yet
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                info!("Opening shared redis connection");
                self.client
                    .get_connection_manager()
                    .await
                    .map_err(|e| CacheError::ConnectionError(e.to_string()))
            })
            .await?;
        Ok(manager.clone())
    }
}

// Only a dropped connection resets the pool; ConnectionManager reconnects on its own
// after transient I/O errors.
fn driver_error(e: redis::RedisError) -> CacheError {
    if e.is_connection_dropped() || e.is_unrecoverable_error() {
        warn!("Redis connection lost: {}", e);
        CacheError::Disconnected(e.to_string())
    } else {
        CacheError::DriverError(e)
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(driver_error)?;
        debug!("GET {} -> {}", key, if value.is_some() { "hit" } else { "miss" });
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(key, value, ttl_secs.max(1))
            .await
            .map_err(driver_error)?;
        debug!("SET {} ({} bytes, ttl {}s)", key, value.len(), ttl_secs);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(key).await.map_err(driver_error)?;
        debug!("DEL {} -> {}", key, removed);
        Ok(removed)
    }

    async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        let mut conn = self.connection().await?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(driver_error)?;
        if pong != "PONG" {
            return Err(CacheError::ConnectionError(format!(
                "unexpected PING reply: {}",
                pong
            )));
        }
        Ok(start.elapsed())
    }
}
