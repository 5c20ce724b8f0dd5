//! # Bridge Provisioning - Device Identity Lifecycle
//!
//! Secure device onboarding: an admin claims a setup token, the device (or
//! the mobile client acting for it) binds with that token exactly once and
//! receives its pre-shared key, and keys rotate later without downtime.
//!
//! ## Lifecycle
//!
//! ```text
//! claim ──> SetupToken ──bind──> DeviceBinding (token consumed)
//!                        │
//!                        └─TTL──> expired (bind rejected)
//!
//! rotate: active ──> active+rotating (grace) ──> active (old key purged)
//! ```
//!
//! Token and device rows are owned by an external store in production; the
//! in-memory stores here serve single-instance deployments and tests.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod service;
pub mod store;

// Re-export main types
pub use service::{
    BindRequest, ClaimRequest, ProvisioningService, RotateReason, RotateRequest, TokenScope,
    DEFAULT_GRACE_PERIOD_SECS, DEFAULT_TOKEN_TTL_SECS,
};
pub use store::{DeviceStore, InMemoryDeviceStore, InMemoryTokenStore, TokenStore};
