//! Delivery layer
//!
//! Orchestrates the metadata repository, the blob store and the cache for
//! every document operation. Reads are cache-aside: probe the cache, fall
//! back to the repository, write the result back. Mutations invalidate
//! rather than update cached entries.
//!
//! Cache failures never fail a request. A failed read is a miss, a failed
//! write or delete is logged and ignored.
//!
//! List pages are keyed by per-user and public generation counters, so a
//! mutation only has to bump the counters of the users whose lists could
//! contain the document.

pub mod etag;
mod list;
mod mutate;

use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

pub use etag::{weak_etag, CacheHeaders};
pub use list::{decode_cursor, encode_cursor, ListQuery};
pub use mutate::{CreateInput, CreateMeta, CreateOutcome, UploadedFile};

use crate::cache::{keys, Cache};
use crate::db::{DbError, DocRepo, UserRepo};
use crate::model::{Document, Identity};
use crate::storage::{ContentStore, ObjectRead};
use crate::types::{DocError, Envelope, Result};

/// TTLs for cached entries
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub doc_ttl_secs: u64,
    pub list_ttl_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            doc_ttl_secs: 300,
            list_ttl_secs: 60,
        }
    }
}

/// Conditional and partial request parameters of a fetch
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub head: bool,
    pub if_none_match: Option<String>,
    pub range: Option<String>,
}

#[derive(Debug)]
pub enum FetchBody {
    NotModified,
    /// HEAD of a binary document
    FileHead { content_type: String },
    File(ObjectRead),
    /// Serialized `{"data": ...}` envelope
    Json(Bytes),
}

#[derive(Debug)]
pub struct FetchResponse {
    pub headers: CacheHeaders,
    pub body: FetchBody,
}

/// Document operations over repository, blob store and cache
#[derive(Clone)]
pub struct DocService {
    docs: Arc<dyn DocRepo>,
    users: Arc<dyn UserRepo>,
    store: Arc<ContentStore>,
    cache: Arc<dyn Cache>,
    config: DeliveryConfig,
}

impl DocService {
    pub fn new(
        docs: Arc<dyn DocRepo>,
        users: Arc<dyn UserRepo>,
        store: Arc<ContentStore>,
        cache: Arc<dyn Cache>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            docs,
            users,
            store,
            cache,
            config,
        }
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// Fetch a document for `identity`
    ///
    /// A cached metadata entry whose ETag equals `If-None-Match` exactly
    /// answers `NotModified` without a repository round trip.
    pub async fn fetch(&self, identity: &Identity, id: &Uuid, req: FetchRequest) -> Result<FetchResponse> {
        let inm = req.if_none_match.as_deref();

        if inm.is_some() {
            if let Some(cached) = self.cached_meta(id).await {
                let headers = CacheHeaders::for_document(&cached);
                // Only the exact validator skips the ACL query; `*` and lists wait for it
                if inm.map(str::trim) == Some(headers.etag.as_str()) {
                    debug!(doc_id = %id, "Conditional hit on cached metadata");
                    return Ok(FetchResponse {
                        headers,
                        body: FetchBody::NotModified,
                    });
                }
            }
        }

        let (doc, json) = self
            .docs
            .doc_by_id(id, Some(&identity.user_id))
            .await
            .map_err(read_err)?;

        if let Ok(raw) = serde_json::to_vec(&doc) {
            self.cache_set(&keys::doc_meta(id), Bytes::from(raw), self.config.doc_ttl_secs)
                .await;
        }

        let headers = CacheHeaders::for_document(&doc);
        if etag::if_none_match(inm, &headers.etag) {
            return Ok(FetchResponse {
                headers,
                body: FetchBody::NotModified,
            });
        }

        if doc.file {
            if req.head {
                return Ok(FetchResponse {
                    headers,
                    body: FetchBody::FileHead {
                        content_type: doc.mime,
                    },
                });
            }

            let mut read = self
                .store
                .get(&doc.storage_key, req.range.as_deref())
                .await
                .map_err(|e| {
                    DocError::Unexpected(format!("blob {} unreadable: {}", doc.storage_key, e))
                })?;
            read.content_type = doc.mime;
            return Ok(FetchResponse {
                headers,
                body: FetchBody::File(read),
            });
        }

        let json_key = keys::doc_json(id);
        if let Some(cached) = self.cache_get(&json_key).await {
            return Ok(FetchResponse {
                headers,
                body: FetchBody::Json(cached),
            });
        }

        let body = Envelope::data(json.unwrap_or_else(|| json!({}))).to_bytes()?;
        self.cache_set(&json_key, body.clone(), self.config.doc_ttl_secs)
            .await;

        Ok(FetchResponse {
            headers,
            body: FetchBody::Json(body),
        })
    }

    async fn cached_meta(&self, id: &Uuid) -> Option<Document> {
        let raw = self.cache_get(&keys::doc_meta(id)).await?;
        match serde_json::from_slice(&raw) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!(doc_id = %id, error = %e, "Discarding unreadable cached metadata");
                None
            }
        }
    }

    async fn cache_get(&self, key: &str) -> Option<Bytes> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn cache_set(&self, key: &str, value: Bytes, ttl_secs: u64) {
        if let Err(e) = self.cache.set(key, value, ttl_secs).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    async fn cache_del(&self, keys: &[String]) {
        if let Err(e) = self.cache.del(keys).await {
            warn!(?keys, error = %e, "Cache delete failed");
        }
    }
}

/// Read-path mapping: absence stays absence, the rest is unexpected
fn read_err(err: DbError) -> DocError {
    match err {
        DbError::NotFound => DocError::NotFound,
        other => DocError::Unexpected(other.to_string()),
    }
}

fn write_err(err: DbError) -> DocError {
    DocError::Unexpected(err.to_string())
}
