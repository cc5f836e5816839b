//! Domain records shared by the repository, cache and delivery layers

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document metadata row
///
/// `storage_key` is non-empty iff `file` is true. `version` starts at 1 and
/// grows by exactly one on every metadata-affecting mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub mime: String,
    pub file: bool,
    pub public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub size_bytes: i64,
    /// Hex SHA-256 of the binary payload, empty without binary content
    pub sha256: String,
    pub version: i64,
    pub storage_key: String,
}

/// Input for creating a document row
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub owner_id: Uuid,
    pub name: String,
    pub mime: String,
    pub public: bool,
    pub size_bytes: i64,
    pub sha256: String,
    pub storage_key: String,
}

impl NewDocument {
    pub fn has_file(&self) -> bool {
        !self.storage_key.is_empty()
    }
}

/// Registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    #[serde(skip_serializing)]
    pub pass_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Resolved caller identity, passed explicitly through every call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub login: String,
    /// Token id of the credential the identity came from
    pub jti: String,
}

impl Identity {
    pub fn new(user_id: Uuid, login: impl Into<String>) -> Self {
        Self {
            user_id,
            login: login.into(),
            jti: String::new(),
        }
    }
}

/// List sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListSort {
    NameAsc,
    NameDesc,
    CreatedAsc,
    #[default]
    CreatedDesc,
}

impl ListSort {
    /// Parse a `sort` query value; unknown values fall back to the default
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name_asc" => Self::NameAsc,
            "name_desc" => Self::NameDesc,
            "created_asc" => Self::CreatedAsc,
            _ => Self::CreatedDesc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
            Self::CreatedAsc => "created_asc",
            Self::CreatedDesc => "created_desc",
        }
    }

    /// ORDER BY clause, always ending in a unique tiebreaker
    pub fn order_by(&self) -> &'static str {
        match self {
            Self::NameAsc => "d.name ASC, d.created_at DESC, d.id DESC",
            Self::NameDesc => "d.name DESC, d.created_at DESC, d.id DESC",
            Self::CreatedAsc => "d.created_at ASC, d.id ASC",
            Self::CreatedDesc => "d.created_at DESC, d.id DESC",
        }
    }

    /// Keyset predicate for rows past a `(created_at, id)` cursor
    ///
    /// Name orders have no keyset on `(created_at, id)`, so they do not page.
    pub fn cursor_predicate(&self) -> Option<&'static str> {
        match self {
            Self::CreatedAsc => Some("(d.created_at > ? OR (d.created_at = ? AND d.id > ?))"),
            Self::CreatedDesc => Some("(d.created_at < ? OR (d.created_at = ? AND d.id < ?))"),
            Self::NameAsc | Self::NameDesc => None,
        }
    }
}

/// Keyset pagination position: rows past `(created_at, id)` in the sort direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Repository list filter
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Restrict to documents owned by this login
    pub login: Option<String>,
    /// Equality filter; only `name` and `mime` are honored
    pub key: Option<String>,
    pub value: Option<String>,
    pub sort: ListSort,
    pub limit: i64,
    pub cursor: Option<ListCursor>,
}

impl ListFilter {
    /// Page size with out-of-range values replaced by the default
    pub fn effective_limit(&self) -> i64 {
        clamp_limit(self.limit)
    }

    /// Whitelisted `(column, value)` equality filter, if any
    pub fn column_filter(&self) -> Option<(&'static str, &str)> {
        let value = self.value.as_deref()?;
        match self.key.as_deref()? {
            "name" => Some(("d.name", value)),
            "mime" => Some(("d.mime", value)),
            _ => None,
        }
    }
}

pub fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 || limit > MAX_LIST_LIMIT {
        DEFAULT_LIST_LIMIT
    } else {
        limit
    }
}

/// Fixed-width timestamp encoding so text order equals time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// `Last-Modified` header value (RFC 1123, GMT)
pub fn http_date(ts: &DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
