//! Validators for conditional requests

use crate::model::{http_date, Document};

pub const CACHE_CONTROL: &str = "private, max-age=60";

/// Weak ETag `W/"<version>-<first 8 hex of sha256>"`
pub fn weak_etag(version: i64, sha256: &str) -> String {
    let prefix = sha256.get(..8).unwrap_or(sha256);
    format!("W/\"{}-{}\"", version, prefix)
}

/// `If-None-Match` check; accepts `*` and comma separated lists
pub fn if_none_match(header: Option<&str>, etag: &str) -> bool {
    let Some(header) = header else {
        return false;
    };
    header
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag)
}

/// Validators sent with every document response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    pub etag: String,
    pub last_modified: String,
    pub cache_control: &'static str,
}

impl CacheHeaders {
    pub fn for_document(doc: &Document) -> Self {
        Self {
            etag: weak_etag(doc.version, &doc.sha256),
            last_modified: http_date(&doc.updated_at),
            cache_control: CACHE_CONTROL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_etag() {
        assert_eq!(
            weak_etag(1, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"),
            "W/\"1-2cf24dba\""
        );
        assert_eq!(weak_etag(1, ""), "W/\"1-\"");
        assert_eq!(weak_etag(7, "abc"), "W/\"7-abc\"");
    }

    #[test]
    fn test_if_none_match() {
        let etag = "W/\"2-2cf24dba\"";
        assert!(if_none_match(Some("W/\"2-2cf24dba\""), etag));
        assert!(if_none_match(Some("\"x\", W/\"2-2cf24dba\""), etag));
        assert!(if_none_match(Some("*"), etag));
        assert!(!if_none_match(Some("W/\"1-2cf24dba\""), etag));
        assert!(!if_none_match(None, etag));
    }
}
