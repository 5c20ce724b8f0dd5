//! # Bus Publisher
//!
//! The publishing side of the message bus.

use crate::filter::MessageFilter;
use crate::subscriber::{MessageStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use bridge_types::BridgeMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Trait for publishing messages to the bus.
///
/// Adapters and the dispatcher publish through this interface so tests can
/// swap the bus for an instrumented double.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish a message to the bus.
    ///
    /// # Returns
    ///
    /// The number of active subscribers that received the message.
    async fn publish(&self, message: BridgeMessage) -> usize;

    /// Total number of messages published.
    fn messages_published(&self) -> u64;
}

/// In-memory message bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer
/// semantics. Suitable for a single bridge process; a multi-instance
/// deployment would put a broker-backed implementation behind the same
/// traits.
pub struct MessageBus {
    /// Broadcast sender for messages.
    sender: broadcast::Sender<BridgeMessage>,

    /// Active subscription count by filter description.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Total messages published.
    messages_published: AtomicU64,

    /// Per-subscriber channel capacity.
    capacity: usize,
}

impl MessageBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with a specific per-subscriber capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            messages_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to messages matching a filter.
    ///
    /// Returns a [`Subscription`] handle; dropping it cancels the
    /// subscription.
    #[must_use]
    pub fn subscribe(&self, filter: MessageFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let filter_key = filter.describe();

        {
            if let Ok(mut subs) = self.subscriptions.write() {
                *subs.entry(filter_key.clone()).or_insert(0) += 1;
            }
        }

        debug!(filter = %filter_key, "new bus subscription");

        Subscription::new(receiver, filter, self.subscriptions.clone(), filter_key)
    }

    /// Subscribe and wrap the subscription in a `Stream`.
    #[must_use]
    pub fn message_stream(&self, filter: MessageFilter) -> MessageStream {
        MessageStream::new(self.subscribe(filter))
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Per-subscriber channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusPublisher for MessageBus {
    async fn publish(&self, message: BridgeMessage) -> usize {
        let kind = message.kind();
        let device_id = message.device_id().to_owned();

        // Count the attempt even when nobody is listening
        self.messages_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(message) {
            Ok(receiver_count) => {
                debug!(
                    kind = %kind,
                    device_id = %device_id,
                    receivers = receiver_count,
                    "message published"
                );
                receiver_count
            }
            Err(e) => {
                // No receivers - message is dropped
                warn!(
                    kind = %kind,
                    device_id = %device_id,
                    error = %e,
                    "message dropped (no receivers)"
                );
                0
            }
        }
    }

    fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}
