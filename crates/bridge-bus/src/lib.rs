//! # Bridge Bus - Universal Message Routing
//!
//! Single in-process routing point between protocol adapters and downstream
//! consumers.
//!
//! ## Routing Rules
//!
//! - Adapters publish normalized [`bridge_types::BridgeMessage`]s here;
//!   consumers subscribe by message kind (and optionally device).
//! - Dispatch is fire-and-forget per message: a slow or failing subscriber
//!   lags and drops oldest, it never backpressures the publisher.
//! - Delivery to a single subscriber preserves publish order; ordering
//!   across subscribers is not guaranteed.
//! - No retry and no persistence at this layer; that is the command
//!   dispatcher's job downstream.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Adapter    │                    │   Consumer   │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │ Message Bus  │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod filter;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use filter::MessageFilter;
pub use publisher::{BusPublisher, MessageBus};
pub use subscriber::{MessageStream, Subscription, SubscriptionError};

/// Maximum messages buffered per subscriber before oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
