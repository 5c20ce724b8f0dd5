//! # Transport Adapter Contract
//!
//! The polymorphic contract every protocol adapter implements. Variants
//! differ only in wire encoding and transport; the message model is
//! transport-independent.

use crate::errors::{AdapterInitError, DeliveryError};
use crate::message::{Ack, Command, Telemetry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Supported transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Mqtt,
    Http,
    #[serde(rename = "websocket")]
    WebSocket,
    Serial,
    Ble,
    /// Inbound push integrations (LoRaWAN network-server callbacks).
    Webhook,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mqtt => write!(f, "mqtt"),
            Self::Http => write!(f, "http"),
            Self::WebSocket => write!(f, "websocket"),
            Self::Serial => write!(f, "serial"),
            Self::Ble => write!(f, "ble"),
            Self::Webhook => write!(f, "webhook"),
        }
    }
}

/// The contract every transport adapter implements.
///
/// - `init` is idempotent; calling it on an initialized adapter is a no-op.
/// - `publish_telemetry` hands a normalized report downstream and must not
///   block device I/O.
/// - `send_command` attempts delivery to the device. A returned
///   `Ack { ok: false, .. }` means the device rejected the command; a
///   [`DeliveryError`] means the transport could not reach it.
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    /// The transport this adapter speaks.
    fn transport(&self) -> Transport;

    /// Idempotent setup: connect to the broker, bind the socket, open the
    /// link. Fails with [`AdapterInitError`] when the transport is
    /// unreachable.
    async fn init(&self) -> Result<(), AdapterInitError>;

    /// Publish a validated telemetry report downstream.
    async fn publish_telemetry(&self, telemetry: Telemetry) -> Result<(), DeliveryError>;

    /// Deliver a command to the device and report the outcome.
    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError>;
}

/// Shared handle to a type-erased adapter.
pub type DynAdapter = Arc<dyn BridgeAdapter>;
