use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use policydb_core::config::CacheConfig;
use policydb_core::types::{FusedResult, FusionMethod, FusionParams};

/// Trimmed, lowercased, single-spaced.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

/// Identifies one cached response. Fusion parameters enter by bit pattern,
/// so any change of alpha, k or method is a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    top_k: usize,
    method: FusionMethod,
    alpha_bits: u32,
    rrf_k_bits: u32,
}

impl CacheKey {
    pub fn new(query: &str, top_k: usize, params: &FusionParams) -> Self {
        Self {
            query: normalize_query(query),
            top_k,
            method: params.method,
            alpha_bits: params.alpha.to_bits(),
            rrf_k_bits: params.rrf_k.to_bits(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub results: Vec<FusedResult>,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
    inserted: Instant,
}

impl CacheEntry {
    /// Wall-clock time since the entry was stored.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.created_at)
    }
}

/// Bounded LRU of fused responses with optional age expiry.
///
/// Every read-modify-write happens under one lock, so a lookup never observes
/// a half-written entry and an expired entry is removed before a miss is reported.
pub struct QueryCache {
    entries: Option<Mutex<LruCache<CacheKey, CacheEntry>>>,
    ttl: Option<Duration>,
}

impl QueryCache {
    /// `capacity == 0` disables caching; `ttl == None` disables expiry.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self { entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))), ttl }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self::new(cfg.capacity, cfg.ttl())
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<FusedResult>> {
        let mut guard = self.lock()?;
        let expired = self.is_expired(guard.peek(key)?);
        if expired {
            guard.pop(key);
            return None;
        }
        let entry = guard.get_mut(key)?;
        entry.hit_count += 1;
        debug!(query = key.query(), age_ms = entry.age().num_milliseconds(), hits = entry.hit_count, "cache entry reused");
        Some(entry.results.clone())
    }

    pub fn put(&self, key: CacheKey, results: Vec<FusedResult>) {
        if let Some(mut guard) = self.lock() {
            guard.put(key, CacheEntry { results, created_at: Utc::now(), hit_count: 0, inserted: Instant::now() });
        }
    }

    /// Entry as stored, without touching recency or hit counts.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock()?.peek(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |g| g.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Some(mut guard) = self.lock() {
            guard.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl.is_some_and(|ttl| entry.inserted.elapsed() >= ttl)
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<CacheKey, CacheEntry>>> {
        self.entries.as_ref().map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
