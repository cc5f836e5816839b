//! Content-addressed store over an object backend
//!
//! `put` makes a single pass over the input: one producer reads the caller's
//! stream, feeds the SHA-256 hasher and writes into a duplex pipe while the
//! backend uploads the other end of the pipe to `tmp/<uuid>`. Memory use is
//! bounded by the pipe buffer regardless of payload size. Once the digest is
//! known the temporary object is promoted to `sha256/<hex>`.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::range::parse_range;
use super::{ObjectBackend, ObjectReader, StorageError, SHA256_PREFIX, TMP_PREFIX};

/// Duplex pipe capacity between the hashing producer and the uploader
const PIPE_BUF_SIZE: usize = 64 * 1024;

/// Read chunk size for the producer
const READ_CHUNK_SIZE: usize = 32 * 1024;

/// Result of storing a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// `sha256/<hex>`
    pub storage_key: String,
    pub size: u64,
    /// Hex SHA-256 of the payload
    pub sha256: String,
    /// Whether an identical object was already stored
    pub deduplicated: bool,
}

/// Streamed object body plus the headers needed to serve it
pub struct ObjectRead {
    /// Positioned at the first requested byte; dropping it closes the object
    pub reader: ObjectReader,
    pub content_length: u64,
    /// `bytes A-B/total` when a range was honored
    pub content_range: Option<String>,
    pub content_type: String,
    pub etag: String,
    pub total_size: u64,
}

impl std::fmt::Debug for ObjectRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRead")
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .field("content_type", &self.content_type)
            .field("etag", &self.etag)
            .field("total_size", &self.total_size)
            .finish()
    }
}

/// Storage key for a hex digest
pub fn sha256_key(hex_digest: &str) -> String {
    format!("{}{}", SHA256_PREFIX, hex_digest)
}

/// Content-addressed blob store
pub struct ContentStore {
    backend: Arc<dyn ObjectBackend>,
}

impl ContentStore {
    pub fn new(backend: Arc<dyn ObjectBackend>) -> Self {
        Self { backend }
    }

    /// Store a stream, returning its content-addressed key.
    ///
    /// On failure no final object is written and the temporary object is
    /// removed best-effort. Nothing is retried.
    pub async fn put<R>(&self, mut reader: R, hint_name: &str, mime: &str) -> Result<PutResult, StorageError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let tmp_key = format!("{}{}", TMP_PREFIX, uuid::Uuid::new_v4());
        let (mut pipe_tx, mut pipe_rx) = tokio::io::duplex(PIPE_BUF_SIZE);

        let produce = async move {
            let mut hasher = Sha256::new();
            let mut buf = vec![0u8; READ_CHUNK_SIZE];
            let mut size = 0u64;
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                pipe_tx.write_all(&buf[..n]).await?;
                size += n as u64;
            }
            pipe_tx.shutdown().await?;
            Ok::<_, StorageError>((hex::encode(hasher.finalize()), size))
        };
        let upload = self.backend.put(&tmp_key, &mut pipe_rx, mime);

        let ((sha256, size), uploaded) = match tokio::try_join!(produce, upload) {
            Ok(done) => done,
            Err(e) => {
                warn!(tmp_key = %tmp_key, name = %hint_name, error = %e, "Upload failed");
                self.discard(&tmp_key).await;
                return Err(e);
            }
        };

        if uploaded != size {
            self.discard(&tmp_key).await;
            return Err(StorageError::Rejected(format!(
                "backend stored {} of {} bytes",
                uploaded, size
            )));
        }

        let storage_key = sha256_key(&sha256);
        let deduplicated = match self.backend.head(&storage_key).await {
            Ok(existing) => existing.is_some(),
            Err(e) => {
                self.discard(&tmp_key).await;
                return Err(e);
            }
        };

        if !deduplicated {
            if let Err(e) = self.backend.copy(&tmp_key, &storage_key).await {
                self.discard(&tmp_key).await;
                return Err(e);
            }
        }
        self.discard(&tmp_key).await;

        info!(
            storage_key = %storage_key,
            name = %hint_name,
            size,
            deduplicated,
            "Stored blob"
        );

        Ok(PutResult {
            storage_key,
            size,
            sha256,
            deduplicated,
        })
    }

    /// Open an object for reading, honoring a single-range `Range` header
    pub async fn get(&self, storage_key: &str, range_header: Option<&str>) -> Result<ObjectRead, StorageError> {
        let meta = self
            .backend
            .head(storage_key)
            .await?
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))?;

        let range = range_header.and_then(|h| parse_range(h, meta.size));
        let (offset, content_length, content_range) = match range {
            Some(r) => (r.start, r.len(), Some(r.content_range())),
            None => (0, meta.size, None),
        };

        let reader = self.backend.get(storage_key, offset, content_length).await?;
        debug!(
            storage_key = %storage_key,
            offset,
            content_length,
            total = meta.size,
            "Opened blob"
        );

        Ok(ObjectRead {
            reader,
            content_length,
            content_range,
            content_type: meta.content_type,
            etag: meta.etag,
            total_size: meta.size,
        })
    }

    /// Remove an object; absence is not an error
    pub async fn delete(&self, storage_key: &str) -> Result<(), StorageError> {
        self.backend.delete(storage_key).await
    }

    pub async fn exists(&self, storage_key: &str) -> Result<bool, StorageError> {
        Ok(self.backend.head(storage_key).await?.is_some())
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        self.backend.ping().await
    }

    async fn discard(&self, tmp_key: &str) {
        if let Err(e) = self.backend.delete(tmp_key).await {
            warn!(tmp_key = %tmp_key, error = %e, "Failed to remove temporary object");
        }
    }
}
