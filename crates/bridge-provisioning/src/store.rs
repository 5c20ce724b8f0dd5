//! # Provisioning Stores
//!
//! Ports to the persistent rows behind provisioning. Production deployments
//! implement these against their relational store; the in-memory versions
//! here are for single-instance use and tests.

use async_trait::async_trait;
use bridge_security::DeviceDirectory;
use bridge_types::{BridgeError, Device, SetupToken};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Port to setup-token rows.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist a freshly issued token.
    async fn insert(&self, token: SetupToken) -> Result<(), BridgeError>;

    /// Fetch a token by its string.
    async fn find(&self, token: &str) -> Result<Option<SetupToken>, BridgeError>;

    /// Atomically flip the token to consumed.
    ///
    /// Returns `true` only for the caller that performed the flip; a token
    /// is consumed exactly once even under concurrent binds.
    async fn mark_consumed(&self, token: &str) -> Result<bool, BridgeError>;
}

/// Port to device rows.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn insert(&self, device: Device) -> Result<(), BridgeError>;

    async fn find(&self, device_id: &str) -> Result<Option<Device>, BridgeError>;

    /// Replace the stored record for `device.device_id`.
    async fn update(&self, device: Device) -> Result<(), BridgeError>;

    /// Every stored device id. Used by maintenance sweeps.
    async fn device_ids(&self) -> Vec<String>;
}

/// In-memory [`TokenStore`]. Single-instance only.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, SetupToken>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert(&self, token: SetupToken) -> Result<(), BridgeError> {
        self.tokens.write().insert(token.token.clone(), token);
        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<SetupToken>, BridgeError> {
        Ok(self.tokens.read().get(token).cloned())
    }

    async fn mark_consumed(&self, token: &str) -> Result<bool, BridgeError> {
        let mut tokens = self.tokens.write();
        match tokens.get_mut(token) {
            Some(stored) if !stored.consumed => {
                stored.consumed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory [`DeviceStore`]. Single-instance only.
#[derive(Default)]
pub struct InMemoryDeviceStore {
    devices: RwLock<HashMap<String, Device>>,
}

impl InMemoryDeviceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn insert(&self, device: Device) -> Result<(), BridgeError> {
        self.devices
            .write()
            .insert(device.device_id.clone(), device);
        Ok(())
    }

    async fn find(&self, device_id: &str) -> Result<Option<Device>, BridgeError> {
        Ok(self.devices.read().get(device_id).cloned())
    }

    async fn update(&self, device: Device) -> Result<(), BridgeError> {
        let mut devices = self.devices.write();
        if !devices.contains_key(&device.device_id) {
            return Err(BridgeError::validation(
                "device_id",
                format!("unknown device {}", device.device_id),
            ));
        }
        devices.insert(device.device_id.clone(), device);
        Ok(())
    }

    async fn device_ids(&self) -> Vec<String> {
        self.devices.read().keys().cloned().collect()
    }
}

/// Expose the device store to the authenticator.
#[async_trait]
impl DeviceDirectory for InMemoryDeviceStore {
    async fn lookup(&self, device_id: &str) -> Option<Device> {
        self.devices.read().get(device_id).cloned()
    }
}

/// Drop rotation grace keys whose window has closed.
///
/// Called by maintenance sweeps; the authenticator also ignores expired
/// grace keys on its own, so a missed sweep never extends key validity.
pub async fn purge_expired_keys(
    store: &dyn DeviceStore,
    now: DateTime<Utc>,
) -> Result<usize, BridgeError> {
    let mut purged = 0;
    for device_id in store.device_ids().await {
        if let Some(mut device) = store.find(&device_id).await? {
            if device
                .rotating_key
                .as_ref()
                .is_some_and(|r| now >= r.expires_at)
            {
                device.purge_expired_key(now);
                store.update(device).await?;
                purged += 1;
            }
        }
    }
    Ok(purged)
}
