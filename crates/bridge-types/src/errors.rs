//! # Error Taxonomy
//!
//! Expected failures across the bridge core. Authentication and validation
//! failures are surfaced immediately and never retried; delivery failures are
//! retried by the dispatcher and eventually wrapped in `RetryExhausted`.

use crate::adapter::Transport;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a setup token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenFault {
    /// No such token on record.
    #[error("unknown token")]
    Unknown,
    /// Token was already consumed by a bind.
    #[error("token already consumed")]
    Consumed,
    /// Token TTL elapsed.
    #[error("token expired")]
    Expired,
    /// Token string does not have the expected shape.
    #[error("malformed token")]
    Malformed,
    /// Caller IP is not on the token's allow-list.
    #[error("client ip not allowed")]
    IpNotAllowed,
}

/// The bridge-wide error taxonomy.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Missing or invalid credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Setup token unknown, consumed, or expired.
    #[error("setup token invalid: {fault}")]
    TokenInvalid { fault: TokenFault },

    /// Rotation attempted against a non-matching current key.
    #[error("device key mismatch for {device_id}")]
    KeyInvalid { device_id: String },

    /// A bind or command targets a device owned by another tenant.
    #[error("tenant mismatch: device belongs to {owner}")]
    TenantMismatch { owner: String },

    /// Inbound message violates the schema.
    #[error("validation failed on {field}: {message}")]
    Validation { field: String, message: String },

    /// Adapter could not reach the device.
    #[error("delivery failed via {transport}: {message}")]
    Delivery {
        transport: Transport,
        message: String,
    },

    /// Backoff attempts exhausted; wraps the last underlying failure.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Token bucket for the key is empty.
    #[error("rate limit exceeded for {key}")]
    RateLimitExceeded { key: String },
}

impl BridgeError {
    /// Shorthand for a validation failure.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable kind slug for API responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::TokenInvalid { .. } => "token_invalid",
            Self::KeyInvalid { .. } => "key_invalid",
            Self::TenantMismatch { .. } => "tenant_mismatch",
            Self::Validation { .. } => "validation",
            Self::Delivery { .. } => "delivery",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::RateLimitExceeded { .. } => "rate_limited",
        }
    }

    /// Whether the dispatcher may retry after this failure.
    ///
    /// Only transport-level failures are retryable; auth and validation
    /// failures surface immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Delivery { .. })
    }
}

/// Structured error object returned by the provisioning and command APIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Kind slug, e.g. `token_invalid`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&BridgeError> for ErrorBody {
    fn from(err: &BridgeError) -> Self {
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}

/// Failure to bring a transport adapter up.
#[derive(Debug, Clone, Error)]
pub enum AdapterInitError {
    /// The broker, socket, or peripheral could not be reached.
    #[error("{transport} transport unreachable: {message}")]
    Unreachable {
        transport: Transport,
        message: String,
    },

    /// The adapter configuration is unusable.
    #[error("{transport} adapter misconfigured: {message}")]
    Configuration {
        transport: Transport,
        message: String,
    },
}

/// Transport-level delivery failure.
///
/// Distinct from a negative [`crate::Ack`], which means the device received
/// and rejected the command.
#[derive(Debug, Clone, Error)]
#[error("delivery failed via {transport}: {message}")]
pub struct DeliveryError {
    pub transport: Transport,
    pub message: String,
}

impl DeliveryError {
    pub fn new(transport: Transport, message: impl Into<String>) -> Self {
        Self {
            transport,
            message: message.into(),
        }
    }
}

impl From<DeliveryError> for BridgeError {
    fn from(err: DeliveryError) -> Self {
        Self::Delivery {
            transport: err.transport,
            message: err.message,
        }
    }
}
