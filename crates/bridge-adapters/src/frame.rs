//! # Wire Frames
//!
//! JSON encode/decode shared by the framed transports (WebSocket, Serial,
//! BLE), plus the inbound routing step every adapter funnels through.

use crate::pending::AckWaiters;
use bridge_bus::BusPublisher;
use bridge_types::{BridgeError, BridgeMessage};
use tracing::{debug, warn};

/// Decode one frame into the tagged message union.
pub fn decode_frame(bytes: &[u8]) -> Result<BridgeMessage, BridgeError> {
    serde_json::from_slice(bytes).map_err(|e| BridgeError::validation("frame", e.to_string()))
}

/// Encode a message as one frame.
#[must_use]
pub fn encode_frame(message: &BridgeMessage) -> String {
    // Serialization of these types cannot fail: no non-string keys, no
    // non-finite floats survive validation.
    serde_json::to_string(message).unwrap_or_default()
}

/// Admit an inbound message onto the bus.
///
/// Validates first, resolves any in-flight command waiter when the message
/// is an ack, then publishes. Invalid frames are logged and dropped; they
/// must not take the adapter down.
pub async fn route_inbound(
    bus: &dyn BusPublisher,
    waiters: &AckWaiters,
    message: BridgeMessage,
) -> Result<(), BridgeError> {
    message.validate()?;

    if let BridgeMessage::Ack(ack) = &message {
        if waiters.resolve(ack) {
            debug!(command_id = %ack.command_id, "ack matched in-flight command");
        }
    }

    bus.publish(message).await;
    Ok(())
}

/// [`route_inbound`] for raw frame bytes; decode failures are logged with
/// device context left to the caller.
pub async fn route_inbound_frame(bus: &dyn BusPublisher, waiters: &AckWaiters, bytes: &[u8]) {
    match decode_frame(bytes) {
        Ok(message) => {
            if let Err(err) = route_inbound(bus, waiters, message).await {
                warn!(error = %err, "inbound message rejected");
            }
        }
        Err(err) => warn!(error = %err, "undecodable inbound frame dropped"),
    }
}
