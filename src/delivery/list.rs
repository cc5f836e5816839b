//! Cached, ACL-filtered document listing

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{read_err, DocService};
use crate::cache::keys::{self, ListFingerprint, PUBLIC_LIST_GENERATION};
use crate::model::{
    format_timestamp, parse_timestamp, Document, Identity, ListCursor, ListFilter, ListSort,
};
use crate::types::{DocError, Envelope, Result};

/// Raw list parameters as they arrive in the query string
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub login: Option<String>,
    pub key: Option<String>,
    pub value: Option<String>,
    pub limit: Option<String>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListItem {
    id: Uuid,
    name: String,
    mime: String,
    file: bool,
    public: bool,
    created: String,
    grant: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ListPage {
    docs: Vec<ListItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
}

/// Opaque cursor token: base64url of `<created_at>|<id>`
pub fn encode_cursor(doc: &Document) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}|{}", format_timestamp(&doc.created_at), doc.id))
}

pub fn decode_cursor(token: &str) -> Result<ListCursor> {
    let bad = || DocError::BadInput(format!("malformed cursor {:?}", token));
    let raw = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|_| bad())?;
    let raw = String::from_utf8(raw).map_err(|_| bad())?;
    let (created, id) = raw.split_once('|').ok_or_else(bad)?;
    Ok(ListCursor {
        created_at: parse_timestamp(created).ok_or_else(bad)?,
        id: Uuid::parse_str(id).map_err(|_| bad())?,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ListQuery {
    fn to_filter(&self) -> Result<ListFilter> {
        let cursor = match non_empty(&self.cursor) {
            Some(token) => Some(decode_cursor(&token)?),
            None => None,
        };
        let limit = self
            .limit
            .as_deref()
            .and_then(|l| l.trim().parse::<i64>().ok())
            .unwrap_or(0);

        let sort = self.sort.as_deref().map(ListSort::parse).unwrap_or_default();
        if cursor.is_some() && sort.cursor_predicate().is_none() {
            return Err(DocError::BadInput(format!(
                "cursor is not supported with sort {}",
                sort.as_str()
            )));
        }

        Ok(ListFilter {
            login: non_empty(&self.login),
            key: non_empty(&self.key),
            value: non_empty(&self.value),
            sort,
            limit,
            cursor,
        })
    }
}

impl DocService {
    /// One page of documents visible to `identity`, as the serialized envelope
    ///
    /// Identical queries between two mutations return identical bytes.
    pub async fn list(&self, identity: &Identity, query: ListQuery) -> Result<Bytes> {
        let filter = query.to_filter()?;
        let limit = filter.effective_limit();

        let cache_key = match self.list_generations(&identity.user_id).await {
            Some((own_gen, public_gen)) => {
                let limit = limit.to_string();
                let own_gen = own_gen.to_string();
                let public_gen = public_gen.to_string();
                let cursor = non_empty(&query.cursor).unwrap_or_default();
                let login = filter.login.clone().unwrap_or_default();
                let key = filter.key.clone().unwrap_or_default();
                let value = filter.value.clone().unwrap_or_default();
                let fingerprint = ListFingerprint::new(&[
                    ("cursor", cursor.as_str()),
                    ("key", key.as_str()),
                    ("limit", limit.as_str()),
                    ("login", login.as_str()),
                    ("sort", filter.sort.as_str()),
                    ("value", value.as_str()),
                    ("gen", own_gen.as_str()),
                    ("pubgen", public_gen.as_str()),
                ]);
                Some(keys::list_page(&identity.user_id, &fingerprint))
            }
            None => None,
        };

        if let Some(ref key) = cache_key {
            if let Some(cached) = self.cache_get(key).await {
                debug!(user_id = %identity.user_id, key = %key, "List cache hit");
                return Ok(cached);
            }
        }

        let docs = self
            .docs
            .list_docs(&identity.user_id, &filter)
            .await
            .map_err(read_err)?;

        let pages = filter.sort.cursor_predicate().is_some();
        let next = (pages && docs.len() as i64 == limit)
            .then(|| docs.last().map(encode_cursor))
            .flatten();

        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            let grant = self.docs.granted_logins(&doc.id).await.map_err(read_err)?;
            items.push(ListItem {
                id: doc.id,
                created: doc.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                name: doc.name,
                mime: doc.mime,
                file: doc.file,
                public: doc.public,
                grant,
            });
        }

        let body = Envelope::data(ListPage { docs: items, next }).to_bytes()?;

        if let Some(ref key) = cache_key {
            self.cache_set(key, body.clone(), self.config.list_ttl_secs)
                .await;
        }
        Ok(body)
    }

    /// Current `(own, public)` generations, `None` when unreadable
    async fn list_generations(&self, user_id: &Uuid) -> Option<(i64, i64)> {
        let own = self.generation(&keys::list_generation(user_id)).await?;
        let public = self.generation(PUBLIC_LIST_GENERATION).await?;
        Some((own, public))
    }

    async fn generation(&self, key: &str) -> Option<i64> {
        match self.cache.get(key).await {
            Ok(None) => Some(0),
            Ok(Some(raw)) => {
                let parsed = std::str::from_utf8(&raw)
                    .ok()
                    .and_then(|s| s.trim().parse::<i64>().ok());
                if parsed.is_none() {
                    warn!(key, "List generation is not a number, serving uncached");
                }
                parsed
            }
            Err(e) => {
                warn!(key, error = %e, "List generation unreadable, serving uncached");
                None
            }
        }
    }

    /// Bump the list generations of every user whose lists may hold `doc`
    pub(super) async fn invalidate_lists(&self, doc: &Document, extra_users: &[Uuid]) {
        let mut users = vec![doc.owner_id];
        for user in extra_users {
            if !users.contains(user) {
                users.push(*user);
            }
        }

        let mut counters: Vec<String> = users.iter().map(keys::list_generation).collect();
        if doc.public {
            counters.push(PUBLIC_LIST_GENERATION.to_string());
        }

        for counter in &counters {
            if let Err(e) = self.cache.incr(counter).await {
                warn!(key = %counter, doc_id = %doc.id, error = %e, "Failed to bump list generation");
            }
        }
        debug!(doc_id = %doc.id, bumped = counters.len(), "Invalidated list pages");
    }
}
