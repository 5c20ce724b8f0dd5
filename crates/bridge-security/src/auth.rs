//! # Device Authenticator
//!
//! Authenticates inbound device requests from signature headers. The
//! signature covers the raw body concatenated with the timestamp, keyed by
//! the device's current key; during a rotation grace window the previous key
//! is honored as well.

use async_trait::async_trait;
use bridge_crypto::verify_request_at;
use bridge_types::{BridgeError, Device};
use chrono::Utc;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

pub const HEADER_DEVICE_ID: &str = "x-device-id";
pub const HEADER_TENANT_ID: &str = "x-tenant-id";
pub const HEADER_SIGNATURE: &str = "x-signature";
pub const HEADER_TIMESTAMP: &str = "x-timestamp";

/// How the caller proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Pre-shared device key (HMAC signature headers).
    Psk,
}

/// Identity granted to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub device_id: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub method: AuthMethod,
}

/// Lookup port for device credentials.
///
/// Implementations might read a provisioning store, a config file, or a key
/// management service.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Returns the device record, or `None` when the device is unknown.
    async fn lookup(&self, device_id: &str) -> Option<Device>;
}

/// Signature-header authenticator.
pub struct Authenticator {
    directory: Arc<dyn DeviceDirectory>,
}

impl Authenticator {
    #[must_use]
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self { directory }
    }

    /// Authenticate an inbound request.
    ///
    /// `headers` must carry lowercase header names; `body` is the raw
    /// request body the signature was computed over.
    pub async fn authenticate(
        &self,
        headers: &HashMap<String, String>,
        body: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<AuthContext, BridgeError> {
        self.authenticate_at(headers, body, client_ip, bridge_crypto::current_timestamp_ms())
            .await
    }

    /// Authenticate against an explicit clock. Exposed for tests.
    pub async fn authenticate_at(
        &self,
        headers: &HashMap<String, String>,
        body: &str,
        client_ip: Option<IpAddr>,
        now_ms: i64,
    ) -> Result<AuthContext, BridgeError> {
        let device_id = required_header(headers, HEADER_DEVICE_ID)?;
        let tenant_id = required_header(headers, HEADER_TENANT_ID)?;
        let signature = required_header(headers, HEADER_SIGNATURE)?;
        let timestamp: i64 = required_header(headers, HEADER_TIMESTAMP)?
            .parse()
            .map_err(|_| BridgeError::Auth(format!("{HEADER_TIMESTAMP} is not a timestamp")))?;

        let Some(device) = self.directory.lookup(device_id).await else {
            warn!(device_id = %device_id, tenant_id = %tenant_id, ip = ?client_ip, "auth failed: unknown device");
            return Err(BridgeError::Auth("unknown device".into()));
        };

        if device.tenant_id != tenant_id {
            warn!(device_id = %device_id, tenant_id = %tenant_id, ip = ?client_ip, "auth failed: tenant mismatch");
            return Err(BridgeError::Auth("tenant mismatch".into()));
        }

        // Active key first, then the rotating key while its grace window is
        // open.
        let authenticated = device
            .valid_keys(Utc::now())
            .iter()
            .any(|key| verify_request_at(key.expose(), body, timestamp, signature, now_ms));

        if !authenticated {
            warn!(device_id = %device_id, tenant_id = %tenant_id, ip = ?client_ip, "auth failed: bad signature or stale timestamp");
            return Err(BridgeError::Auth("signature verification failed".into()));
        }

        debug!(device_id = %device_id, tenant_id = %tenant_id, "device authenticated");

        Ok(AuthContext {
            device_id: device.device_id,
            tenant_id: device.tenant_id,
            farm_id: device.farm_id,
            method: AuthMethod::Psk,
        })
    }
}

fn required_header<'a>(
    headers: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, BridgeError> {
    headers
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| BridgeError::Auth(format!("missing {name} header")))
}
