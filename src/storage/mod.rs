//! Content-addressed blob storage
//!
//! Blobs live under `sha256/<hex>` keys inside an object backend. Uploads
//! land under `tmp/<uuid>` first and are promoted once the digest is known.
//!
//! ## Backends
//!
//! - [`FsBackend`] - directory tree on local disk, one file per key
//! - [`MemoryBackend`] - DashMap of keys to bytes (tests, dev mode)
//!
//! [`ContentStore`] layers hashing, promotion and range reads on top of any
//! [`ObjectBackend`].

pub mod content;
pub mod fs;
pub mod memory;
pub mod range;

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use content::{ContentStore, ObjectRead, PutResult};
pub use fs::FsBackend;
pub use memory::MemoryBackend;
pub use range::{parse_range, ByteRange};

/// Prefix for in-flight uploads
pub const TMP_PREFIX: &str = "tmp/";

/// Prefix for content-addressed objects
pub const SHA256_PREFIX: &str = "sha256/";

/// Owned, sendable byte stream handed back to callers
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Error type for blob storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Backend rejected write: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result of a metadata probe (no body transfer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub content_type: String,
    /// Backend entity tag, quoted
    pub etag: String,
}

/// Object-store capability: the PUT/HEAD/GET/COPY/DELETE surface
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Write `reader` to `key` until EOF, returning bytes written
    async fn put(
        &self,
        key: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        content_type: &str,
    ) -> Result<u64, StorageError>;

    /// Metadata probe; `Ok(None)` when the object does not exist
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// Reader over `len` bytes starting at `offset`
    async fn get(&self, key: &str, offset: u64, len: u64) -> Result<ObjectReader, StorageError>;

    /// Server-side copy
    async fn copy(&self, src: &str, dst: &str) -> Result<(), StorageError>;

    /// Remove an object; a missing object is not an error
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}

/// Reject keys that could escape the backend namespace
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("sha256/abcd").is_ok());
        assert!(validate_key("tmp/1234").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("sha256/../../x").is_err());
        assert!(validate_key("tmp//x").is_err());
    }
}
