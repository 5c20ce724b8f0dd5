//! # Rate Limiter
//!
//! Token bucket admission control per string key (tenant, tenant+device, IP).
//!
//! Buckets are lazily reinitialized: the first consume after `reset_at`
//! refills the bucket to full capacity exactly once. An exhausted bucket can
//! optionally extend its reset into a block window, so a flooding device
//! stays shut out longer than its normal window.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Policy for one limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    /// Allowed operations per window.
    pub points: u32,
    /// Window length.
    pub window: Duration,
    /// Extra shut-out applied when a consume is denied.
    pub block_duration: Option<Duration>,
}

struct Bucket {
    remaining: u32,
    reset_at: Instant,
}

/// Token bucket rate limiter keyed by string.
///
/// Per-key mutation happens under the map's entry lock, so check-then-act on
/// one key cannot race across concurrent callers. State is process-local:
/// single-instance deployments only.
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Coarse tenant-level policy: high capacity, short window.
    #[must_use]
    pub fn tenant_policy() -> Self {
        Self::new(RateLimiterConfig {
            points: 10_000,
            window: Duration::from_secs(60),
            block_duration: None,
        })
    }

    /// Per-device policy: low capacity, extended block on exhaustion.
    #[must_use]
    pub fn device_policy() -> Self {
        Self::new(RateLimiterConfig {
            points: 60,
            window: Duration::from_secs(60),
            block_duration: Some(Duration::from_secs(300)),
        })
    }

    /// Consume one point for `key`.
    ///
    /// Returns `true` when the request is admitted, `false` when the bucket
    /// is empty.
    pub fn consume(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_owned()).or_insert_with(|| {
            debug!(key = %key, "creating rate limit bucket");
            Bucket {
                remaining: self.config.points,
                reset_at: now + self.config.window,
            }
        });

        // Lazy refill: exactly one full refill once the window has passed.
        if now > bucket.reset_at {
            bucket.remaining = self.config.points;
            bucket.reset_at = now + self.config.window;
        }

        if bucket.remaining > 0 {
            bucket.remaining -= 1;
            return true;
        }

        if let Some(block) = self.config.block_duration {
            let blocked_until = now + block;
            if blocked_until > bucket.reset_at {
                bucket.reset_at = blocked_until;
            }
        }

        warn!(key = %key, points = self.config.points, "rate limit exceeded");
        false
    }

    /// Points left for `key` in the current window.
    #[must_use]
    pub fn get_remaining(&self, key: &str) -> u32 {
        match self.buckets.get(key) {
            Some(bucket) if Instant::now() <= bucket.reset_at => bucket.remaining,
            _ => self.config.points,
        }
    }

    /// Forget the bucket for `key`.
    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    /// Drop buckets whose window (and block) has passed. Call periodically.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| bucket.reset_at > now);
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}
