//! # Bridge Types - Unified Message Model and Core Contracts
//!
//! Single source of truth for the types shared across the bridge core:
//! the normalized message model (telemetry, commands, acks), provisioning
//! entities, the error taxonomy, the transport adapter contract, and the
//! TTL cache port.
//!
//! ## Architecture Rules
//!
//! - Every adapter normalizes its wire format into [`BridgeMessage`] before
//!   anything else sees it; validation happens at that boundary.
//! - Identity fields (`device_id`, `tenant_id`) on messages are authoritative
//!   once the security layer has granted an auth context.
//! - Expected failures travel as [`BridgeError`] values, never panics.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapter;
pub mod cache;
pub mod entities;
pub mod errors;
pub mod message;
pub mod units;

// Re-export main types
pub use adapter::{BridgeAdapter, DynAdapter, Transport};
pub use cache::{MemoryTtlCache, TtlCache};
pub use entities::{
    Device, DeviceBinding, DeviceKey, KeyRotation, RotatingKey, SetupPayload, SetupToken,
};
pub use errors::{AdapterInitError, BridgeError, DeliveryError, ErrorBody, TokenFault};
pub use message::{
    Ack, BridgeMessage, Command, CommandState, MessageKind, MetricValue, StatusTag, Telemetry,
};

/// Maximum tolerated clock skew for message timestamps (seconds).
pub const MAX_FUTURE_SKEW_SECS: i64 = 10;

/// Default command delivery timeout when a command does not carry one.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;
