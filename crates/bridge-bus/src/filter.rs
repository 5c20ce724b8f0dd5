//! # Subscription Filters
//!
//! Selects which bus messages a subscriber receives.

use bridge_types::{BridgeMessage, MessageKind};

/// Filter applied to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    /// Message kinds to receive. Empty means every kind.
    pub kinds: Vec<MessageKind>,
    /// Restrict to a single device's stream.
    pub device_id: Option<String>,
}

impl MessageFilter {
    /// Receive everything.
    #[must_use]
    pub fn all() -> Self {
        Self {
            kinds: Vec::new(),
            device_id: None,
        }
    }

    /// Receive only the given kinds.
    #[must_use]
    pub fn kinds(kinds: Vec<MessageKind>) -> Self {
        Self {
            kinds,
            device_id: None,
        }
    }

    /// Narrow the filter to one device.
    #[must_use]
    pub fn for_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Whether a message passes this filter.
    #[must_use]
    pub fn matches(&self, message: &BridgeMessage) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&message.kind()) {
            return false;
        }
        match &self.device_id {
            Some(device_id) => message.device_id() == device_id,
            None => true,
        }
    }

    /// Stable key describing this filter, used for subscription accounting.
    #[must_use]
    pub fn describe(&self) -> String {
        let kinds = if self.kinds.is_empty() {
            "*".to_owned()
        } else {
            self.kinds
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        };
        match &self.device_id {
            Some(device_id) => format!("{kinds}@{device_id}"),
            None => kinds,
        }
    }
}
