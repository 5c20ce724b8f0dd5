//! # TTL Cache Port
//!
//! Shared, TTL-bounded, atomically updated key-value state. Business logic
//! depends on this trait, never on a concrete store: the in-memory
//! implementation below serves single-instance deployments and tests, while
//! multi-instance deployments plug in a networked key-value store behind the
//! same port.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Capability contract for TTL-bounded key-value state.
#[async_trait]
pub trait TtlCache: Send + Sync {
    /// Fetch a live value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration);

    /// Remove a value.
    async fn delete(&self, key: &str);

    /// Atomically replace the value for `key` only if the current live value
    /// equals `expected` (`None` = key absent). Returns whether the swap
    /// happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        value: Value,
        ttl: Duration,
    ) -> bool;
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`TtlCache`].
///
/// Process-local: suitable only for single-instance deployments and tests.
/// Expired entries are evicted lazily on access and by [`Self::purge_expired`].
#[derive(Default)]
pub struct MemoryTtlCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryTtlCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drop every expired entry. Call periodically from a maintenance task.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TtlCache for MemoryTtlCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        // Read under the guard, then evict outside it: removing while the
        // read guard is alive would deadlock on the shard lock.
        let live = {
            let entry = self.entries.get(key)?;
            entry.is_live(now).then(|| entry.value.clone())
        };
        if live.is_none() {
            self.entries.remove(key);
        }
        live
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(
            key.to_owned(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        value: Value,
        ttl: Duration,
    ) -> bool {
        let now = Instant::now();
        // The entry guard holds the shard lock, so check-then-act on one key
        // cannot race with another caller of the same key.
        match self.entries.entry(key.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let live = occupied.get().is_live(now);
                let matches = match expected {
                    Some(expected) => live && occupied.get().value == *expected,
                    None => !live,
                };
                if matches {
                    occupied.insert(CacheEntry {
                        value,
                        expires_at: now + ttl,
                    });
                }
                matches
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(CacheEntry {
                        value,
                        expires_at: now + ttl,
                    });
                    true
                } else {
                    false
                }
            }
        }
    }
}
