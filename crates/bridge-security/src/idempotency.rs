//! # Idempotency Store
//!
//! At-most-once execution cache keyed by caller-supplied idempotency keys.
//!
//! A key's recorded result is returned without re-invoking the handler for
//! the record's TTL. Concurrent callers with the same key coordinate through
//! a per-key gate, so the handler runs at most once even when identical
//! requests arrive simultaneously. Only successful results are recorded;
//! a failed handler leaves the key replayable.
//!
//! Storage goes through the [`TtlCache`] port: the default in-memory cache
//! serves a single instance, and a multi-instance deployment swaps in a
//! shared store without touching this logic.

use bridge_types::{BridgeError, MemoryTtlCache, TtlCache};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Default record lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// At-most-once execution cache.
pub struct IdempotencyStore {
    ttl: Duration,
    records: Arc<dyn TtlCache>,
    /// Per-key gates serializing concurrent callers of the same key.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl IdempotencyStore {
    /// In-memory store with the default 24 h TTL. Single-instance only.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache(Arc::new(MemoryTtlCache::new()), DEFAULT_TTL)
    }

    /// In-memory store with a custom record TTL.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_cache(Arc::new(MemoryTtlCache::new()), ttl)
    }

    /// Store over an explicit cache backend.
    #[must_use]
    pub fn with_cache(records: Arc<dyn TtlCache>, ttl: Duration) -> Self {
        Self {
            ttl,
            records,
            inflight: DashMap::new(),
        }
    }

    /// Fetch the live recorded value for `key`.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.records.get(key).await
    }

    /// Record a value for `key` with the store TTL.
    pub async fn set(&self, key: &str, value: Value) {
        self.records.set(key, value, self.ttl).await;
    }

    /// Forget `key`, making it replayable immediately.
    pub async fn delete(&self, key: &str) {
        self.records.delete(key).await;
    }

    /// Drop gates nobody is waiting on. Call periodically alongside the
    /// backend's own expiry sweep.
    pub fn purge_idle_gates(&self) {
        self.inflight
            .retain(|_, gate| Arc::strong_count(gate) > 1);
    }

    /// Run `handler` at most once for `key` within the TTL window.
    ///
    /// A cache hit returns the recorded result without invoking `handler`.
    /// Concurrent callers with the same key await the in-flight execution
    /// and then read its recorded result.
    pub async fn handle<T, F, Fut>(&self, key: &str, handler: F) -> Result<T, BridgeError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        if let Some(value) = self.get(key).await {
            debug!(key = %key, "idempotency cache hit");
            return decode(value);
        }

        let gate = {
            let entry = self
                .inflight
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };
        let _guard = gate.lock().await;

        // Re-check under the gate: another caller may have finished while we
        // waited.
        if let Some(value) = self.get(key).await {
            debug!(key = %key, "idempotency cache hit after wait");
            return decode(value);
        }

        let result = handler().await?;
        let value = serde_json::to_value(&result)
            .map_err(|e| BridgeError::validation("idempotency", e.to_string()))?;
        self.set(key, value).await;
        Ok(result)
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|e| BridgeError::validation("idempotency", e.to_string()))
}
