//! Create, delete, touch and grant management

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{read_err, write_err, DocService};
use crate::cache::keys;
use crate::model::{Document, Identity, NewDocument};
use crate::storage::PutResult;
use crate::types::{DocError, Envelope, Result};

const DEFAULT_NAME: &str = "document";
const DEFAULT_BINARY_MIME: &str = "application/octet-stream";
const DEFAULT_JSON_MIME: &str = "application/json";

/// `meta` part of a create request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateMeta {
    pub name: Option<String>,
    /// Client announces a `file` part
    pub file: bool,
    pub public: bool,
    pub mime: Option<String>,
    /// Logins granted read access
    pub grant: Vec<String>,
}

/// Blob already written by the upload path
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub put: PutResult,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateInput {
    pub meta: CreateMeta,
    pub json: Option<Value>,
    pub file: Option<UploadedFile>,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub document: Document,
    /// Serialized `{"data": {"json": ..., "file": ...}}`
    pub body: Bytes,
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl DocService {
    /// Record a new document; the binary part, if any, is already stored
    pub async fn create(&self, identity: &Identity, input: CreateInput) -> Result<CreateOutcome> {
        let CreateInput { meta, json, file } = input;

        if meta.file && file.is_none() {
            return Err(DocError::BadInput("meta announces a file but none was sent".into()));
        }

        let filename = file.as_ref().and_then(|f| f.filename.as_deref());
        let part_mime = file.as_ref().and_then(|f| f.content_type.as_deref());
        let name = first_non_empty(&[meta.name.as_deref(), filename])
            .unwrap_or(DEFAULT_NAME)
            .to_string();
        let fallback_mime = if file.is_some() {
            DEFAULT_BINARY_MIME
        } else {
            DEFAULT_JSON_MIME
        };
        let mime = first_non_empty(&[meta.mime.as_deref(), part_mime])
            .unwrap_or(fallback_mime)
            .to_string();
        // Served back verbatim as Content-Type
        if hyper::header::HeaderValue::from_str(&mime).is_err() {
            if let Some(ref upload) = file {
                self.discard_upload(&upload.put).await;
            }
            return Err(DocError::BadInput(format!("bad mime type {:?}", mime)));
        }

        let mut new_doc = NewDocument {
            owner_id: identity.user_id,
            name,
            mime,
            public: meta.public,
            ..Default::default()
        };
        if let Some(ref upload) = file {
            new_doc.storage_key = upload.put.storage_key.clone();
            new_doc.sha256 = upload.put.sha256.clone();
            new_doc.size_bytes = i64::try_from(upload.put.size)
                .map_err(|_| DocError::BadInput("file too large".into()))?;
        }

        let document = match self.docs.create_doc(new_doc, json.as_ref()).await {
            Ok(doc) => doc,
            Err(e) => {
                if let Some(ref upload) = file {
                    self.reclaim_blob(&upload.put.storage_key, 0).await;
                }
                return Err(write_err(e));
            }
        };

        let mut grantees = Vec::new();
        for login in &meta.grant {
            let login = login.trim();
            if login.is_empty() || login == identity.login {
                continue;
            }
            match self.docs.upsert_grant(&document.id, login, true).await {
                Ok(0) => warn!(doc_id = %document.id, login, "Grant to unknown login ignored"),
                Ok(_) => grantees.push(login.to_string()),
                Err(e) => warn!(doc_id = %document.id, login, error = %e, "Grant failed"),
            }
        }

        let grantee_ids = self.grantee_ids_or_empty(&document.id).await;
        self.invalidate_lists(&document, &grantee_ids).await;

        info!(
            doc_id = %document.id,
            user_id = %identity.user_id,
            file = document.file,
            public = document.public,
            grants = grantees.len(),
            "Created document"
        );

        let mut data = Map::new();
        data.insert("json".into(), json.unwrap_or(Value::Null));
        if document.file {
            data.insert("file".into(), Value::String(document.name.clone()));
        }
        let body = Envelope::data(Value::Object(data)).to_bytes()?;

        Ok(CreateOutcome { document, body })
    }

    /// Delete a document owned by `identity`
    pub async fn delete(&self, identity: &Identity, id: &Uuid) -> Result<Bytes> {
        let document = self.owned_doc(identity, id).await?;
        // Shares cascade away with the row
        let grantee_ids = self.grantee_ids_or_empty(id).await;

        if document.file {
            self.reclaim_blob(&document.storage_key, 1).await;
        }

        self.docs
            .delete_doc(id, &identity.user_id)
            .await
            .map_err(read_err)?;

        self.cache_del(&[keys::doc_meta(id), keys::doc_json(id)]).await;
        self.invalidate_lists(&document, &grantee_ids).await;

        info!(doc_id = %id, user_id = %identity.user_id, "Deleted document");
        Ok(Envelope::response(json!({ (id.to_string()): true })).to_bytes()?)
    }

    /// Bump version and modification time; the ETag changes
    pub async fn touch(&self, identity: &Identity, id: &Uuid) -> Result<Bytes> {
        let document = self.owned_doc(identity, id).await?;
        let version = self.docs.touch(id).await.map_err(read_err)?;

        self.cache_del(&[keys::doc_meta(id), keys::doc_json(id)]).await;
        let grantee_ids = self.grantee_ids_or_empty(id).await;
        self.invalidate_lists(&document, &grantee_ids).await;

        info!(doc_id = %id, version, "Touched document");
        Ok(Envelope::response(json!({ (id.to_string()): version })).to_bytes()?)
    }

    /// Grant (or store a non-reading grant for) `login`
    pub async fn grant(&self, identity: &Identity, id: &Uuid, login: &str, can_read: bool) -> Result<Bytes> {
        let document = self.owned_doc(identity, id).await?;
        let changed = self
            .docs
            .upsert_grant(id, login, can_read)
            .await
            .map_err(write_err)?;
        if changed == 0 {
            return Err(DocError::BadInput(format!("unknown login {}", login)));
        }
        self.after_grant_change(&document, login).await
    }

    /// Remove any grant held by `login`
    pub async fn revoke(&self, identity: &Identity, id: &Uuid, login: &str) -> Result<Bytes> {
        let document = self.owned_doc(identity, id).await?;
        self.docs
            .remove_grant(id, login)
            .await
            .map_err(write_err)?;
        self.after_grant_change(&document, login).await
    }

    async fn after_grant_change(&self, document: &Document, login: &str) -> Result<Bytes> {
        let grantee = match self.users.user_by_login(login).await {
            Ok(user) => vec![user.id],
            Err(_) => Vec::new(),
        };
        self.invalidate_lists(document, &grantee).await;

        let logins = self
            .docs
            .granted_logins(&document.id)
            .await
            .map_err(read_err)?;
        info!(doc_id = %document.id, login, readers = logins.len(), "Updated grants");
        Ok(Envelope::response(json!({ "grant": logins })).to_bytes()?)
    }

    /// Visible document owned by the caller; visible but foreign is `Forbidden`
    async fn owned_doc(&self, identity: &Identity, id: &Uuid) -> Result<Document> {
        let (document, _) = self
            .docs
            .doc_by_id(id, Some(&identity.user_id))
            .await
            .map_err(read_err)?;
        if document.owner_id != identity.user_id {
            return Err(DocError::Forbidden);
        }
        Ok(document)
    }

    async fn grantee_ids_or_empty(&self, id: &Uuid) -> Vec<Uuid> {
        self.docs.grantee_ids(id).await.unwrap_or_else(|e| {
            warn!(doc_id = %id, error = %e, "Could not load grantees");
            Vec::new()
        })
    }

    /// Drop a blob written for a request that then failed
    ///
    /// A deduplicated upload belongs to whoever stored it first and is kept.
    pub async fn discard_upload(&self, put: &PutResult) {
        if put.deduplicated {
            return;
        }
        self.reclaim_blob(&put.storage_key, 0).await;
    }

    /// Delete a blob unless more than `own_refs` documents still use it
    async fn reclaim_blob(&self, storage_key: &str, own_refs: i64) {
        match self.docs.storage_key_refs(storage_key).await {
            Ok(refs) if refs <= own_refs => {
                if let Err(e) = self.store.delete(storage_key).await {
                    warn!(storage_key, error = %e, "Blob delete failed");
                }
            }
            Ok(refs) => {
                info!(storage_key, refs, "Blob still referenced, keeping it");
            }
            Err(e) => warn!(storage_key, error = %e, "Reference check failed, keeping blob"),
        }
    }
}
