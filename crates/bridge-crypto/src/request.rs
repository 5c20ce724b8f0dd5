//! # Signed Requests
//!
//! Binds a timestamp into the signed payload so a captured request cannot be
//! replayed outside a small window, independent of signature correctness.

use crate::signer::{sign, verify};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Replay window: requests older or newer than this are rejected.
pub const REPLAY_WINDOW_MS: i64 = 300_000;

/// Current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the epoch, which no sane system
/// reports.
#[must_use]
pub fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Sign a request body bound to its timestamp.
///
/// The signature covers `body || timestamp`, matching the device-facing
/// `x-signature`/`x-timestamp` header contract.
#[must_use]
pub fn sign_request(key: &str, body: &str, timestamp_ms: i64) -> String {
    sign(key, &format!("{body}{timestamp_ms}"))
}

/// Verify a signed request against an explicit clock.
///
/// Rejects when the timestamp falls outside [`REPLAY_WINDOW_MS`] even if the
/// signature itself is correct.
#[must_use]
pub fn verify_request_at(
    key: &str,
    body: &str,
    timestamp_ms: i64,
    signature: &str,
    now_ms: i64,
) -> bool {
    let drift = (now_ms - timestamp_ms).abs();
    if drift > REPLAY_WINDOW_MS {
        warn!(drift_ms = drift, "request timestamp outside replay window");
        return false;
    }

    verify(key, &format!("{body}{timestamp_ms}"), signature)
}

/// Verify a signed request against the system clock.
#[must_use]
pub fn verify_request(key: &str, body: &str, timestamp_ms: i64, signature: &str) -> bool {
    verify_request_at(key, body, timestamp_ms, signature, current_timestamp_ms())
}
