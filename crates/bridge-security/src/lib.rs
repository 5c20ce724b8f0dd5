//! # Bridge Security - Admission Control
//!
//! Everything that stands between an inbound request and the bus:
//!
//! - **Rate limiter**: token-bucket admission per tenant and per device
//! - **Idempotency store**: at-most-once execution keyed by caller-supplied
//!   idempotency keys
//! - **Authenticator**: signature-header device authentication honoring
//!   rotation grace keys
//!
//! The check order at the gateway is authenticate -> rate limit -> validate;
//! none of these failures is ever retried.
//!
//! The keyed state here (buckets, idempotency records) is process-local and
//! therefore single-instance only. Multi-instance deployments must back the
//! same interfaces with a shared store.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod auth;
pub mod idempotency;
pub mod rate_limit;

// Re-export main types
pub use auth::{
    AuthContext, AuthMethod, Authenticator, DeviceDirectory, HEADER_DEVICE_ID, HEADER_SIGNATURE,
    HEADER_TENANT_ID, HEADER_TIMESTAMP,
};
pub use idempotency::IdempotencyStore;
pub use rate_limit::{RateLimiter, RateLimiterConfig};
