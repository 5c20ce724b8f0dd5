//! # Bus Subscriber
//!
//! The subscription side of the message bus.

use crate::filter::MessageFilter;
use bridge_types::BridgeMessage;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The bus was dropped.
    #[error("message bus closed")]
    Closed,
}

/// A subscription handle for receiving messages.
///
/// Dropping the handle cancels the subscription.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<BridgeMessage>,

    /// Filter for this subscription.
    filter: MessageFilter,

    /// Reference to subscription accounting (for cleanup).
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Accounting key for this subscription.
    filter_key: String,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BridgeMessage>,
        filter: MessageFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        filter_key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            subscriptions,
            filter_key,
        }
    }

    /// Receive the next message that matches the filter.
    ///
    /// A lagged subscriber loses its oldest messages and keeps going; the
    /// publisher is never blocked on a slow consumer.
    ///
    /// # Returns
    ///
    /// - `Some(message)` - the next matching message
    /// - `None` - the bus was dropped
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "subscriber lagged, oldest messages dropped");
                    continue;
                }
            };

            if self.filter.matches(&message) {
                return Some(message);
            }
            // Message doesn't match filter, continue waiting
        }
    }

    /// Try to receive the next matching message without blocking.
    pub fn try_recv(&mut self) -> Result<Option<BridgeMessage>, SubscriptionError> {
        loop {
            let message = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&message) {
                return Ok(Some(message));
            }
        }
    }

    /// The filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &MessageFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Ok(mut subs) = self.subscriptions.write() else {
            return;
        };
        let Some(count) = subs.get_mut(&self.filter_key) else {
            debug!(filter = %self.filter_key, "subscription dropped");
            return;
        };

        *count = count.saturating_sub(1);
        if *count == 0 {
            subs.remove(&self.filter_key);
        }
        debug!(filter = %self.filter_key, "subscription dropped");
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct MessageStream {
    subscription: Subscription,
}

impl MessageStream {
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    /// The filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &MessageFilter {
        self.subscription.filter()
    }
}

impl Stream for MessageStream {
    type Item = BridgeMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.subscription.try_recv() {
            Ok(Some(message)) => Poll::Ready(Some(message)),
            Ok(None) => {
                // No message ready; re-arm and come back.
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(SubscriptionError::Closed) => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{BusPublisher, MessageBus};
    use bridge_types::{Ack, MessageKind, Telemetry};
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    fn telemetry(device_id: &str) -> BridgeMessage {
        Telemetry::new(device_id).with_metric("temp_c", 20.0).into()
    }

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(MessageFilter::all());

        bus.publish(telemetry("dev-1")).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");

        assert!(matches!(received, BridgeMessage::Telemetry(_)));
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = MessageBus::new();

        // Subscribe only to acks
        let mut sub = bus.subscribe(MessageFilter::kinds(vec![MessageKind::Ack]));

        // Telemetry should be filtered out
        bus.publish(telemetry("dev-1")).await;

        // Ack should be received
        let ack: BridgeMessage = Ack::success("dev-1", Uuid::new_v4()).into();
        bus.publish(ack).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");

        assert!(matches!(received, BridgeMessage::Ack(_)));
    }

    #[tokio::test]
    async fn test_per_device_filter() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(MessageFilter::all().for_device("dev-2"));

        bus.publish(telemetry("dev-1")).await;
        bus.publish(telemetry("dev-2")).await;

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");
        assert_eq!(received.device_id(), "dev-2");
    }

    #[tokio::test]
    async fn test_in_order_delivery_to_single_subscriber() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(MessageFilter::all().for_device("dev-1"));

        for i in 0..10 {
            let msg: BridgeMessage = Telemetry::new("dev-1").with_metric("seq", f64::from(i)).into();
            bus.publish(msg).await;
        }

        for i in 0..10 {
            let received = sub.recv().await.expect("message");
            let BridgeMessage::Telemetry(t) = received else {
                panic!("expected telemetry");
            };
            assert_eq!(t.metrics["seq"].as_number(), Some(f64::from(i)));
        }
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = MessageBus::new();

        {
            let _sub1 = bus.subscribe(MessageFilter::all());
            let _sub2 = bus.subscribe(MessageFilter::all());
            assert_eq!(bus.subscriber_count(), 2);
        }

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_without_blocking_publisher() {
        // Tiny capacity so the idle subscriber lags quickly.
        let bus = MessageBus::with_capacity(4);
        let mut sub = bus.subscribe(MessageFilter::all());

        for i in 0..32 {
            let msg: BridgeMessage = Telemetry::new("dev-1").with_metric("seq", f64::from(i)).into();
            bus.publish(msg).await;
        }

        // Subscriber still receives the newest messages after the lag.
        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("message");
        assert!(matches!(received, BridgeMessage::Telemetry(_)));
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = MessageBus::new();
        let mut sub = bus.subscribe(MessageFilter::all());
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[test]
    fn test_message_stream_filter() {
        let bus = MessageBus::new();
        let stream = bus.message_stream(MessageFilter::kinds(vec![MessageKind::Telemetry]));
        assert_eq!(stream.filter().kinds, vec![MessageKind::Telemetry]);
    }
}
