//! Error types for cache operations
//!
//! Most of the crate never lets these escape: backends convert them into a
//! miss or a no-op. They surface from construction, from the connection pool,
//! and from the remote store trait.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection error - the remote store could not be reached
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The shared connection dropped for good; callers should retry on a fresh one
    #[error("Connection lost: {0}")]
    Disconnected(String),

    /// Operation timeout
    #[error("Operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Payload could not be compressed or decompressed
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// Local filesystem error (file backend)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis driver error (wrapper)
    #[error("Redis driver error: {0}")]
    DriverError(#[from] redis::RedisError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether this error means the shared connection is gone
    pub fn is_disconnect(&self) -> bool {
        match self {
            CacheError::Disconnected(_) => true,
            CacheError::DriverError(e) => e.is_connection_dropped() || e.is_unrecoverable_error(),
            _ => false,
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
