//! Time-bounded cache for batch descriptors.
//!
//! The cache owns no correctness guarantee, only performance: a miss is
//! always transparently repaired by a re-fetch, and entries are never
//! returned past their TTL. It is the single piece of process-lifetime
//! mutable state in the engine.
//!
//! Expiry uses `tokio::time::Instant`, so TTL behavior is testable under
//! paused time.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::domain::{BatchDescriptor, BatchId};

use super::error::CollaboratorError;

/// Cache hit/miss/eviction/expiration counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    last_accessed: Instant,
}

/// Generic TTL + capacity bounded map with lazy expiry and oldest-access
/// eviction.
pub struct TtlCache<K, V> {
    max_entries: usize,
    ttl: Duration,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    stats: CacheStats,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl,
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    /// Get a fresh value; expired entries are removed on access.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        if let Some(entry) = entries.get_mut(key) {
            if now >= entry.expires_at {
                entries.remove(key);
                self.stats.expirations.fetch_add(1, Ordering::Relaxed);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.last_accessed = now;
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.value.clone());
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
                last_accessed: now,
            },
        );
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.write().await;
        entries.remove(key).map(|e| e.value)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Periodic sweep: drop every expired entry.
    pub async fn cleanup_expired(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, e)| now >= e.expires_at)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            entries.remove(&key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Read-through cache for anchored batch descriptors with single-flight
/// fetches.
///
/// Concurrent `get_or_fetch` calls for the same uncached key serialize on a
/// per-key gate: one caller fetches, the rest find the freshly cached value
/// on re-check. A cancelled or failed fetch caches nothing, and a ledger
/// "no such batch" answer is not cached either (the batch may anchor shortly
/// after).
pub struct BatchCache {
    descriptors: TtlCache<BatchId, BatchDescriptor>,
    inflight: Mutex<HashMap<BatchId, Arc<Mutex<()>>>>,
}

impl BatchCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            descriptors: TtlCache::new(max_entries, ttl),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, batch_id: &BatchId) -> Option<BatchDescriptor> {
        self.descriptors.get(batch_id).await
    }

    pub async fn insert(&self, descriptor: BatchDescriptor) {
        self.descriptors
            .insert(descriptor.batch_id.clone(), descriptor)
            .await;
    }

    pub async fn invalidate(&self, batch_id: &BatchId) {
        self.descriptors.remove(batch_id).await;
    }

    pub async fn len(&self) -> usize {
        self.descriptors.len().await
    }

    pub fn stats(&self) -> &CacheStats {
        self.descriptors.stats()
    }

    pub async fn cleanup_expired(&self) {
        self.descriptors.cleanup_expired().await;
    }

    /// Get a descriptor, delegating to `fetch` on miss with single-flight
    /// semantics per key.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        batch_id: &BatchId,
        fetch: F,
    ) -> Result<Option<BatchDescriptor>, CollaboratorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<BatchDescriptor>, CollaboratorError>>,
    {
        if let Some(cached) = self.descriptors.get(batch_id).await {
            return Ok(Some(cached));
        }

        let gate = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(batch_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = gate.lock().await;

        // Another flight may have filled the cache while we waited. Only the
        // caller that actually fetches removes the gate entry.
        if let Some(cached) = self.descriptors.get(batch_id).await {
            return Ok(Some(cached));
        }

        tracing::debug!(batch_id = %batch_id, "cache miss, fetching descriptor");
        let result = fetch().await;

        if let Ok(Some(descriptor)) = &result {
            self.descriptors
                .insert(batch_id.clone(), descriptor.clone())
                .await;
        }
        self.release_gate(batch_id, &gate).await;
        result
    }

    /// Drop the in-flight entry, but only if it is still the gate this flight
    /// was serialized on; a newer flight's gate is left untouched.
    async fn release_gate(&self, batch_id: &BatchId, gate: &Arc<Mutex<()>>) {
        let mut inflight = self.inflight.lock().await;
        if inflight.get(batch_id).is_some_and(|current| Arc::ptr_eq(current, gate)) {
            inflight.remove(batch_id);
        }
    }
}
