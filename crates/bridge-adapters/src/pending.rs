//! # In-Flight Command Tracking
//!
//! Correlates device acks back to the `send_command` call that is awaiting
//! them, keyed by command id.

use bridge_types::Ack;
use dashmap::DashMap;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Waiters for acks of in-flight commands.
#[derive(Default)]
pub struct AckWaiters {
    waiting: DashMap<Uuid, oneshot::Sender<Ack>>,
}

impl AckWaiters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the ack for `command_id`.
    #[must_use]
    pub fn register(&self, command_id: Uuid) -> oneshot::Receiver<Ack> {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(command_id, tx);
        rx
    }

    /// Deliver an ack to its waiter, if one is registered.
    ///
    /// Returns whether a waiter was resolved.
    pub fn resolve(&self, ack: &Ack) -> bool {
        match self.waiting.remove(&ack.command_id) {
            Some((_, tx)) => tx.send(ack.clone()).is_ok(),
            None => false,
        }
    }

    /// Drop the waiter for `command_id` (caller gave up).
    pub fn cancel(&self, command_id: Uuid) {
        self.waiting.remove(&command_id);
    }

    /// Number of commands awaiting acks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
