//! Cache key definitions

use std::fmt;

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generation counter shared by every caller for public documents
pub const PUBLIC_LIST_GENERATION: &str = "listgen:public";

pub fn doc_meta(id: &Uuid) -> String {
    format!("docmeta:{}", id)
}

pub fn doc_json(id: &Uuid) -> String {
    format!("docjson:{}", id)
}

pub fn list_page(user_id: &Uuid, fingerprint: &ListFingerprint) -> String {
    format!("list:{}:{}", user_id, fingerprint)
}

/// Per-user list generation; bumping it orphans every cached page of that user
pub fn list_generation(user_id: &Uuid) -> String {
    format!("listgen:{}", user_id)
}

pub fn revoked_jti(jti: &str) -> String {
    format!("jti:{}", jti)
}

/// Fingerprint of a list query.
///
/// Fields are encoded in sorted name order with explicit separators and then
/// hashed, so logically identical queries always map to the same key while
/// any single differing parameter produces a different one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListFingerprint(String);

impl ListFingerprint {
    pub fn new(fields: &[(&str, &str)]) -> Self {
        let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Sha256::new();
        for (name, value) in sorted {
            // Length prefix keeps "a=b;" style values from colliding
            hasher.update(format!("{}:{}={};", name, value.len(), value).as_bytes());
        }
        let hash = hasher.finalize();
        Self(hex::encode(&hash[..8])) // First 8 bytes = 16 hex chars
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
