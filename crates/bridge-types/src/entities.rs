//! # Provisioning Entities
//!
//! Devices, setup tokens, bindings, and key rotations. The persistent rows
//! behind these types are owned by an external store; the bridge core holds
//! them only as values passing through the claim -> bind -> rotate lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A pre-shared device key.
///
/// Wrapped so key material never leaks through `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceKey(String);

impl DeviceKey {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw key material. Callers sign with it; they must not log it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceKey(****)")
    }
}

/// An old key kept valid during a rotation grace window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotatingKey {
    pub key: DeviceKey,
    /// The old key is rejected after this instant.
    pub expires_at: DateTime<Utc>,
}

/// A provisioned device.
///
/// Created on a successful bind; the key is replaced (never the device) on
/// rotation. The core never hard-deletes devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub device_type: String,
    pub capabilities: Vec<String>,
    pub active_key: DeviceKey,
    /// Present only while a rotation grace window is open.
    pub rotating_key: Option<RotatingKey>,
    /// Optional X.509 public key for certificate-based auth.
    pub public_key: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// Keys that currently authenticate this device: the active key, plus
    /// the rotating key while its grace window is open.
    #[must_use]
    pub fn valid_keys(&self, now: DateTime<Utc>) -> Vec<&DeviceKey> {
        let mut keys = vec![&self.active_key];
        if let Some(rotating) = &self.rotating_key {
            if now < rotating.expires_at {
                keys.push(&rotating.key);
            }
        }
        keys
    }

    /// Drop the rotating key once its grace window has closed.
    pub fn purge_expired_key(&mut self, now: DateTime<Utc>) {
        if let Some(rotating) = &self.rotating_key {
            if now >= rotating.expires_at {
                self.rotating_key = None;
            }
        }
    }
}

/// A short-lived credential authorizing exactly one bind.
///
/// State machine: issued -> consumed (successful bind) or issued -> expired
/// (TTL elapsed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupToken {
    pub token: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_allowlist: Option<Vec<IpAddr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub consumed: bool,
}

impl SetupToken {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the caller IP satisfies the allow-list. No list means any IP.
    #[must_use]
    pub fn allows_ip(&self, ip: Option<IpAddr>) -> bool {
        match (&self.ip_allowlist, ip) {
            (None, _) => true,
            (Some(list), Some(ip)) => list.contains(&ip),
            (Some(_), None) => false,
        }
    }
}

/// The immutable result of a successful bind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub device_id: String,
    pub device_type: String,
    pub tenant_id: String,
    pub farm_id: Option<String>,
    /// Freshly issued pre-shared key; this is the only time it leaves the
    /// bridge in the clear.
    pub device_key: DeviceKey,
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// The result of a key rotation.
///
/// Both keys authenticate until `expires_at`; the old key is rejected after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRotation {
    pub device_id: String,
    pub old_key: DeviceKey,
    pub new_key: DeviceKey,
    /// Grace window length in seconds.
    pub grace_period_secs: u64,
    pub expires_at: DateTime<Utc>,
}

/// The scannable payload produced by a claim, consumed by the mobile client
/// or the device itself during onboarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupPayload {
    pub server_url: String,
    pub setup_token: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_id: Option<String>,
    pub protocol: String,
}
