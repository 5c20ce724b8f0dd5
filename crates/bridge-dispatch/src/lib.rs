//! # Bridge Dispatch - Command Delivery
//!
//! The path a command takes from a downstream consumer to a device:
//!
//! ```text
//! consumer ──dispatch()──> [idempotency] ──> [retry + timeout] ──> adapter ──> device
//!                                │                                              │
//!                                └── cached Ack                     Ack ────────┘
//! ```
//!
//! Guarantees:
//!
//! - Commands to one device dispatch in submission order (per-device FIFO
//!   workers); cross-device ordering is not guaranteed.
//! - A command with an idempotency key delivers at most once per TTL window,
//!   even when dispatched concurrently; every caller receives the same Ack.
//! - Transport failures retry with bounded exponential backoff and surface
//!   as `RetryExhausted`; auth and validation failures surface immediately.
//! - A command timeout resolves the caller with a delivery failure, never a
//!   hang.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod dispatcher;
pub mod log;
pub mod retry;

// Re-export main types
pub use dispatcher::{CommandDispatcher, DispatcherConfig};
pub use log::{CommandLog, LoggedCommand};
pub use retry::{retry_with_backoff, RetryPolicy};
