//! # Bridge Crypto - Signing Primitives
//!
//! The single, authoritative implementation of device authentication
//! primitives used across the bridge:
//!
//! - **HMAC-SHA256 signatures** over request payloads, hex-encoded
//! - **Constant-time verification** (never a direct byte comparison)
//! - **Timestamp-window replay protection** for signed requests
//! - **Key generation** for device keys and setup tokens
//!
//! Every adapter and the gateway use these functions rather than rolling
//! their own, so policy changes propagate everywhere at once.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod keys;
pub mod request;
pub mod signer;

pub use keys::{generate_device_key, generate_setup_token};
pub use request::{
    current_timestamp_ms, sign_request, verify_request, verify_request_at, REPLAY_WINDOW_MS,
};
pub use signer::{sign, verify};
