//! # Retry Executor
//!
//! Bounded exponential-backoff retry for any fallible async operation.
//! Transport-agnostic: it wraps command delivery the same way it would wrap
//! a flaky store write.

use bridge_types::BridgeError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt `attempt` (0-based):
    /// `min(initial_delay * factor^attempt, max_delay)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt);
        self.initial_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Invoke `op`, retrying retryable failures with exponential backoff.
///
/// Non-retryable failures (auth, validation) surface immediately. After the
/// attempts are exhausted the last failure is wrapped in
/// [`BridgeError::RetryExhausted`].
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let mut last_error: Option<BridgeError> = None;

    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt == policy.max_retries {
                    last_error = Some(err);
                    break;
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    next_delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
                last_error = Some(err);
                sleep(delay).await;
            }
        }
    }

    let last = last_error.map_or_else(|| "unknown".to_owned(), |e| e.to_string());
    Err(BridgeError::RetryExhausted {
        attempts: policy.max_retries,
        last_error: last,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{DeliveryError, Transport};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(failures: u32) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, BridgeError>> + Send>> {
        let calls = std::sync::Arc::new(AtomicU32::new(0));
        move || {
            let calls = std::sync::Arc::clone(&calls);
            Box::pin(async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(DeliveryError::new(Transport::Mqtt, "broker down").into())
                } else {
                    Ok(n)
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures_with_expected_backoff() {
        let policy = RetryPolicy::default();
        let start = tokio::time::Instant::now();

        let result = retry_with_backoff(policy, flaky(2)).await.unwrap();

        // Third call succeeded; the two sleeps were 1000 ms and 2000 ms.
        assert_eq!(result, 2);
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };

        let err = retry_with_backoff(policy, flaky(10)).await.unwrap_err();
        let BridgeError::RetryExhausted {
            attempts,
            last_error,
        } = err
        else {
            panic!("expected RetryExhausted");
        };
        assert_eq!(attempts, 2);
        assert!(last_error.contains("broker down"));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = retry_with_backoff(RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(BridgeError::Auth("bad signature".into())) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, BridgeError::Auth(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_is_capped_at_max() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
        // 2^5 * 1000 ms = 32 s, capped at 30 s.
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
        // Far past overflow territory the cap still holds.
        assert_eq!(policy.delay_for(64), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn test_immediate_success_sleeps_nothing() {
        let result = retry_with_backoff(RetryPolicy::default(), || async { Ok(1u32) })
            .await
            .unwrap();
        assert_eq!(result, 1);
    }
}
