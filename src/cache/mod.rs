//! Caching layer for docvault
//!
//! A small KV + counter capability used cache-aside in front of the metadata
//! repository. The cache is an optimization only: every caller treats a cache
//! error as a miss (reads) or logs and continues (writes, deletes).
//!
//! ## Key namespaces
//!
//! - `docmeta:<id>` - serialized document metadata
//! - `docjson:<id>` - serialized `{"data": ...}` envelope of a JSON body
//! - `list:<user>:<fingerprint>` - serialized list page envelope
//! - `listgen:<user>` / `listgen:public` - list generation counters
//! - `jti:<jti>` - revoked token markers
//!
//! See [`keys`] for builders and the list fingerprint.

pub mod keys;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

pub use keys::ListFingerprint;
pub use memory::{spawn_cleanup_task, CacheStats, MemoryCache};

/// Error type for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Value at {0} is not an integer")]
    NotInteger(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// KV + counter capability
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(None)` on miss
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store a value; `ttl_secs == 0` means no expiry
    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<(), CacheError>;

    async fn del(&self, keys: &[String]) -> Result<(), CacheError>;

    /// Increment a counter (missing counts as 0), returning the new value
    async fn incr(&self, key: &str) -> Result<i64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub max_entries: usize,
    /// Cleanup interval
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            cleanup_interval: Duration::from_secs(60), // Run cleanup every minute
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::default()
        }
    }
}
