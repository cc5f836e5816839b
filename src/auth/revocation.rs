//! Revoked token list kept in the cache

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::jwt::now_secs;
use super::AuthError;
use crate::cache::{keys, Cache};

/// Revocation markers under `jti:<jti>`, each expiring with its token
#[derive(Clone)]
pub struct RevocationList {
    cache: Arc<dyn Cache>,
}

impl RevocationList {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Revoke a token id until `exp` (Unix seconds)
    pub async fn revoke(&self, jti: &str, exp: u64) -> Result<(), AuthError> {
        // An already expired token still gets a short marker
        let ttl = exp.saturating_sub(now_secs()?).max(1);
        self.cache
            .set(&keys::revoked_jti(jti), Bytes::from_static(b"1"), ttl)
            .await
            .map_err(|e| AuthError::Internal(format!("Failed to revoke token: {}", e)))?;
        debug!(jti, ttl, "Revoked token");
        Ok(())
    }

    /// Cache failures read as "not revoked"
    pub async fn is_revoked(&self, jti: &str) -> bool {
        match self.cache.get(&keys::revoked_jti(jti)).await {
            Ok(marker) => marker.is_some(),
            Err(e) => {
                warn!(jti, error = %e, "Revocation check failed, treating token as live");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use async_trait::async_trait;

    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn set(&self, _key: &str, _value: Bytes, _ttl: u64) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn del(&self, _keys: &[String]) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn incr(&self, _key: &str) -> Result<i64, CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_revoke_marks_jti() {
        let cache = Arc::new(MemoryCache::with_defaults());
        let list = RevocationList::new(cache.clone());
        let exp = now_secs().unwrap() + 600;

        assert!(!list.is_revoked("abc").await);
        list.revoke("abc", exp).await.unwrap();
        assert!(list.is_revoked("abc").await);
        assert!(!list.is_revoked("other").await);
        assert!(cache.get("jti:abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cache_failure_reads_as_live() {
        let list = RevocationList::new(Arc::new(BrokenCache));
        assert!(!list.is_revoked("abc").await);
        assert!(list.revoke("abc", 0).await.is_err());
    }
}
