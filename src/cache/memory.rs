//! In-memory cache implementation
//!
//! DashMap-backed KV store with per-entry TTL, lazy expiry on read, a periodic
//! cleanup task and oldest-first eviction when over capacity. Counters created
//! by `incr` are never evicted, since losing one would let a stale
//! generation-keyed entry become visible again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, info};

use super::{Cache, CacheConfig, CacheError};

/// A cached value with expiry metadata
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    created_at: Instant,
    expires_at: Option<Instant>,
    /// Counters survive capacity eviction
    pinned: bool,
}

impl CacheEntry {
    fn new(value: Bytes, ttl_secs: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: (ttl_secs > 0).then(|| now + Duration::from_secs(ttl_secs)),
            pinned: false,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// In-memory KV + counter cache
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    /// Remove expired entries
    pub fn cleanup(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let count = before.saturating_sub(self.entries.len());

        if count > 0 {
            debug!(count = count, "Cleaned up expired cache entries");
        }
        count
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Evict entries if over capacity (oldest first, counters excluded)
    fn maybe_evict(&self) {
        let len = self.entries.len();
        if len <= self.config.max_entries {
            return;
        }

        // Evict a little extra to avoid thrashing
        let to_evict = len - self.config.max_entries + self.config.max_entries / 100;

        let mut candidates: Vec<(String, Instant)> = self
            .entries
            .iter()
            .filter(|entry| !entry.pinned)
            .map(|entry| (entry.key().clone(), entry.created_at))
            .collect();
        candidates.sort_by_key(|(_, created)| *created);

        let mut evicted = 0;
        for (key, _) in candidates.into_iter().take(to_evict) {
            self.entries.remove(&key);
            evicted += 1;
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);

        debug!(evicted = evicted, "Evicted cache entries");
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                return Ok(Some(entry.value.clone()));
            }
            // Release the read guard before removing
            drop(entry);
            self.entries.remove(key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, "Cache miss");
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl_secs: u64) -> Result<(), CacheError> {
        debug!(key = key, ttl_secs = ttl_secs, "Cache set");
        self.entries
            .insert(key.to_string(), CacheEntry::new(value, ttl_secs));
        self.maybe_evict();
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, CacheError> {
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(Bytes::from_static(b"0"), 0));

        if entry.is_expired() {
            *entry = CacheEntry::new(Bytes::from_static(b"0"), 0);
        }

        let current: i64 = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CacheError::NotInteger(key.to_string()))?;
        let next = current + 1;

        entry.value = Bytes::from(next.to_string());
        entry.pinned = true;
        Ok(next)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Spawn a background task to periodically cleanup expired entries
pub fn spawn_cleanup_task(cache: Arc<MemoryCache>) {
    let interval = cache.config.cleanup_interval;

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = cache.cleanup();
            let stats = cache.stats();
            debug!(
                removed = removed,
                entries = stats.entries,
                hit_rate = format!("{:.1}%", stats.hit_rate()),
                "Cache cleanup completed"
            );
        }
    });

    info!("Cache cleanup task started");
}
