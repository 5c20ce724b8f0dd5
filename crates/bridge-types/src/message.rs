//! # Unified Message Model
//!
//! The protocol-independent messages routed by the bus: device telemetry,
//! commands, and command acknowledgements. Adapters translate their wire
//! formats into these types and validate them before publishing.

use crate::errors::BridgeError;
use crate::MAX_FUTURE_SKEW_SECS;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// A single metric value reported by a device.
///
/// Vendor payloads are open-ended, so values may be numeric, textual, or
/// boolean. Numeric values must be finite to pass validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Numeric reading (temperature, EC, battery percentage, ...).
    Number(f64),
    /// Boolean flag (relay on/off, door open, ...).
    Flag(bool),
    /// Free-form text (firmware version, vendor status string, ...).
    Text(String),
}

impl MetricValue {
    /// Numeric view of this value, if it is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

/// Coarse health tag attached to a telemetry report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusTag {
    Ok,
    Warn,
    Err,
}

/// A normalized telemetry report from one device.
///
/// Immutable once emitted onto the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Device identifier, unique within the owning tenant.
    pub device_id: String,
    /// Report timestamp (RFC 3339 on the wire).
    pub ts: DateTime<Utc>,
    /// Metric name -> value map. Ordered for stable serialization.
    pub metrics: BTreeMap<String, MetricValue>,
    /// Optional device-reported health tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusTag>,
}

impl Telemetry {
    /// Create a telemetry report stamped with the current time.
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ts: Utc::now(),
            metrics: BTreeMap::new(),
            status: None,
        }
    }

    /// Add a metric reading.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<MetricValue>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// Set the health tag.
    #[must_use]
    pub fn with_status(mut self, status: StatusTag) -> Self {
        self.status = Some(status);
        self
    }

    /// Validate shape invariants before the report is admitted onto the bus.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.device_id.is_empty() {
            return Err(BridgeError::validation("device_id", "must not be empty"));
        }
        if self.metrics.is_empty() {
            return Err(BridgeError::validation("metrics", "must not be empty"));
        }
        for (key, value) in &self.metrics {
            if key.is_empty() {
                return Err(BridgeError::validation("metrics", "metric key is empty"));
            }
            if let MetricValue::Number(n) = value {
                if !n.is_finite() {
                    return Err(BridgeError::validation(
                        "metrics",
                        format!("metric '{key}' is not a finite number"),
                    ));
                }
            }
        }
        let skew = ChronoDuration::seconds(MAX_FUTURE_SKEW_SECS);
        if self.ts > Utc::now() + skew {
            return Err(BridgeError::validation("ts", "timestamp is in the future"));
        }
        Ok(())
    }
}

/// Dispatcher-visible lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    /// Accepted, not yet handed to an adapter (visible to polling devices).
    Pending,
    /// Handed to the transport adapter.
    Sent,
    /// Device acknowledged execution.
    Acknowledged,
    /// Delivery or execution failed.
    Failed,
}

/// A command addressed to one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Target device identifier.
    pub device_id: String,
    /// Correlation id; every ack carries it back.
    pub command_id: Uuid,
    /// Command type understood by the device, e.g. `relay_control`.
    pub command_type: String,
    /// Open-ended parameter bag (vendor escape hatch).
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Caller-supplied at-most-once key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Delivery timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Submission timestamp; pending commands are polled in this order.
    pub issued_at: DateTime<Utc>,
}

impl Command {
    /// Create a command with a fresh correlation id.
    #[must_use]
    pub fn new(device_id: impl Into<String>, command_type: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            command_id: Uuid::new_v4(),
            command_type: command_type.into(),
            params: Map::new(),
            idempotency_key: None,
            timeout_ms: None,
            issued_at: Utc::now(),
        }
    }

    /// Set a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Attach an idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Set the delivery timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Delivery timeout, if the caller set one.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validate shape invariants.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.device_id.is_empty() {
            return Err(BridgeError::validation("device_id", "must not be empty"));
        }
        if self.command_type.is_empty() {
            return Err(BridgeError::validation("command_type", "must not be empty"));
        }
        if let Some(key) = &self.idempotency_key {
            if key.is_empty() {
                return Err(BridgeError::validation(
                    "idempotency_key",
                    "must not be empty when present",
                ));
            }
        }
        Ok(())
    }
}

/// Acknowledgement for exactly one command, correlated by `command_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Reporting device.
    pub device_id: String,
    /// Correlation id of the acknowledged command.
    pub command_id: Uuid,
    /// Whether the device executed the command.
    pub ok: bool,
    /// Optional human-readable detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optional machine-readable error code when `ok` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Acknowledgement timestamp.
    pub ts: DateTime<Utc>,
}

impl Ack {
    /// Positive acknowledgement.
    #[must_use]
    pub fn success(device_id: impl Into<String>, command_id: Uuid) -> Self {
        Self {
            device_id: device_id.into(),
            command_id,
            ok: true,
            message: None,
            code: None,
            ts: Utc::now(),
        }
    }

    /// Device-side rejection. This is a negative result, not a transport
    /// failure; transport failures are `DeliveryError`.
    #[must_use]
    pub fn rejected(
        device_id: impl Into<String>,
        command_id: Uuid,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            command_id,
            ok: false,
            message: Some(message.into()),
            code: Some(code.into()),
            ts: Utc::now(),
        }
    }

    /// Attach a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The kind of a bus message, used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Telemetry,
    Command,
    Ack,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telemetry => write!(f, "telemetry"),
            Self::Command => write!(f, "command"),
            Self::Ack => write!(f, "ack"),
        }
    }
}

/// Tagged union of everything the bus routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BridgeMessage {
    Telemetry(Telemetry),
    Command(Command),
    Ack(Ack),
}

impl BridgeMessage {
    /// The message kind, for routing.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Telemetry(_) => MessageKind::Telemetry,
            Self::Command(_) => MessageKind::Command,
            Self::Ack(_) => MessageKind::Ack,
        }
    }

    /// The device this message concerns.
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::Telemetry(t) => &t.device_id,
            Self::Command(c) => &c.device_id,
            Self::Ack(a) => &a.device_id,
        }
    }

    /// Validate the wrapped message.
    pub fn validate(&self) -> Result<(), BridgeError> {
        match self {
            Self::Telemetry(t) => t.validate(),
            Self::Command(c) => c.validate(),
            Self::Ack(a) => {
                if a.device_id.is_empty() {
                    return Err(BridgeError::validation("device_id", "must not be empty"));
                }
                Ok(())
            }
        }
    }
}

impl From<Telemetry> for BridgeMessage {
    fn from(t: Telemetry) -> Self {
        Self::Telemetry(t)
    }
}

impl From<Command> for BridgeMessage {
    fn from(c: Command) -> Self {
        Self::Command(c)
    }
}

impl From<Ack> for BridgeMessage {
    fn from(a: Ack) -> Self {
        Self::Ack(a)
    }
}
