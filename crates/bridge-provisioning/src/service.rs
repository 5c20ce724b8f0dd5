//! # Provisioning Service
//!
//! Claim, bind, and rotate over the token and device stores.

use crate::store::{DeviceStore, TokenStore};
use bridge_crypto::{generate_device_key, generate_setup_token};
use bridge_types::{
    BridgeError, Device, DeviceBinding, KeyRotation, RotatingKey, SetupPayload, SetupToken,
    TokenFault,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Default setup-token lifetime.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 600;

/// Default rotation grace window.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 3600;

/// Request to issue a setup token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_id: Option<String>,
    /// Token lifetime in seconds; defaults to 600.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_allowlist: Option<Vec<IpAddr>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Request to bind a device with a setup token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindRequest {
    pub setup_token: String,
    pub device_id: String,
    pub device_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Why a key is being rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateReason {
    ScheduledRotation,
    KeyCompromised,
}

/// Request to rotate a device key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotateRequest {
    pub device_id: String,
    pub current_key: String,
    pub reason: RotateReason,
}

/// Tenant scope decoded from a verified setup token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenScope {
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_id: Option<String>,
}

/// The claim -> bind -> rotate lifecycle over pluggable stores.
pub struct ProvisioningService {
    tokens: Arc<dyn TokenStore>,
    devices: Arc<dyn DeviceStore>,
}

impl ProvisioningService {
    #[must_use]
    pub fn new(tokens: Arc<dyn TokenStore>, devices: Arc<dyn DeviceStore>) -> Self {
        Self { tokens, devices }
    }

    /// Issue a setup token for one device binding.
    pub async fn claim(&self, req: ClaimRequest) -> Result<SetupToken, BridgeError> {
        if req.tenant_id.is_empty() {
            return Err(BridgeError::validation("tenant_id", "must not be empty"));
        }

        let ttl = req.ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        let token = SetupToken {
            token: generate_setup_token(),
            tenant_id: req.tenant_id,
            farm_id: req.farm_id,
            expires_at: Utc::now() + Duration::seconds(ttl as i64),
            ip_allowlist: req.ip_allowlist,
            user_agent: req.user_agent,
            consumed: false,
        };
        self.tokens.insert(token.clone()).await?;

        info!(
            tenant_id = %token.tenant_id,
            farm_id = ?token.farm_id,
            expires_at = %token.expires_at,
            "setup token issued"
        );
        Ok(token)
    }

    /// The scannable payload the admin UI turns into a QR code.
    #[must_use]
    pub fn setup_payload(
        &self,
        token: &SetupToken,
        server_url: &str,
        protocol: &str,
    ) -> SetupPayload {
        SetupPayload {
            server_url: server_url.to_owned(),
            setup_token: token.token.clone(),
            tenant_id: token.tenant_id.clone(),
            farm_id: token.farm_id.clone(),
            protocol: protocol.to_owned(),
        }
    }

    /// Bind a device, consuming the setup token exactly once.
    pub async fn bind(&self, req: BindRequest) -> Result<DeviceBinding, BridgeError> {
        if req.device_id.is_empty() {
            return Err(BridgeError::validation("device_id", "must not be empty"));
        }

        let token = self.validate_token(&req.setup_token, None).await?;

        // A device id is unique within its tenant; rebinding goes through
        // rotate, not bind.
        if let Some(existing) = self.devices.find(&req.device_id).await? {
            if existing.tenant_id == token.tenant_id {
                return Err(BridgeError::validation(
                    "device_id",
                    format!("device {} is already bound", req.device_id),
                ));
            }
            return Err(BridgeError::TenantMismatch {
                owner: existing.tenant_id,
            });
        }

        // Claim the token before persisting the device; the loser of a
        // concurrent bind race sees it as consumed.
        if !self.tokens.mark_consumed(&req.setup_token).await? {
            warn!(device_id = %req.device_id, "bind lost token race");
            return Err(BridgeError::TokenInvalid {
                fault: TokenFault::Consumed,
            });
        }

        let device_key = generate_device_key();
        let device = Device {
            device_id: req.device_id.clone(),
            tenant_id: token.tenant_id.clone(),
            farm_id: token.farm_id.clone(),
            device_type: req.device_type.clone(),
            capabilities: req.capabilities.clone(),
            active_key: device_key.clone(),
            rotating_key: None,
            public_key: req.public_key.clone(),
            last_seen_at: None,
            created_at: Utc::now(),
        };
        self.devices.insert(device).await?;

        info!(
            device_id = %req.device_id,
            tenant_id = %token.tenant_id,
            device_type = %req.device_type,
            "device bound"
        );

        Ok(DeviceBinding {
            device_id: req.device_id,
            device_type: req.device_type,
            tenant_id: token.tenant_id,
            farm_id: token.farm_id,
            device_key,
            capabilities: req.capabilities,
            public_key: req.public_key,
        })
    }

    /// Rotate a device key with a grace window for the old key.
    pub async fn rotate(&self, req: RotateRequest) -> Result<KeyRotation, BridgeError> {
        self.rotate_with_grace(req, DEFAULT_GRACE_PERIOD_SECS).await
    }

    /// Rotate with an explicit grace window length.
    pub async fn rotate_with_grace(
        &self,
        req: RotateRequest,
        grace_period_secs: u64,
    ) -> Result<KeyRotation, BridgeError> {
        let Some(mut device) = self.devices.find(&req.device_id).await? else {
            warn!(device_id = %req.device_id, "rotate rejected: unknown device");
            return Err(BridgeError::KeyInvalid {
                device_id: req.device_id,
            });
        };

        if device.active_key.expose() != req.current_key {
            warn!(device_id = %req.device_id, reason = ?req.reason, "rotate rejected: key mismatch");
            return Err(BridgeError::KeyInvalid {
                device_id: req.device_id,
            });
        }

        let old_key = device.active_key.clone();
        let new_key = generate_device_key();
        let expires_at = Utc::now() + Duration::seconds(grace_period_secs as i64);

        device.rotating_key = Some(RotatingKey {
            key: old_key.clone(),
            expires_at,
        });
        device.active_key = new_key.clone();
        self.devices.update(device).await?;

        info!(
            device_id = %req.device_id,
            reason = ?req.reason,
            grace_secs = grace_period_secs,
            "device key rotated"
        );

        Ok(KeyRotation {
            device_id: req.device_id,
            old_key,
            new_key,
            grace_period_secs,
            expires_at,
        })
    }

    /// Validate a setup token and decode its tenant scope.
    ///
    /// Failures are logged with the client IP for audit.
    pub async fn verify_setup_token(
        &self,
        token: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<TokenScope, BridgeError> {
        let token = self.validate_token(token, client_ip).await?;
        Ok(TokenScope {
            tenant_id: token.tenant_id,
            farm_id: token.farm_id,
        })
    }

    /// Update a device's last-seen timestamp.
    pub async fn touch(&self, device_id: &str) -> Result<(), BridgeError> {
        if let Some(mut device) = self.devices.find(device_id).await? {
            device.last_seen_at = Some(Utc::now());
            self.devices.update(device).await?;
        }
        Ok(())
    }

    async fn validate_token(
        &self,
        token: &str,
        client_ip: Option<IpAddr>,
    ) -> Result<SetupToken, BridgeError> {
        let fail = |fault: TokenFault| {
            warn!(ip = ?client_ip, fault = %fault, "setup token rejected");
            BridgeError::TokenInvalid { fault }
        };

        if !token.starts_with("ST_") {
            return Err(fail(TokenFault::Malformed));
        }

        let Some(stored) = self.tokens.find(token).await? else {
            return Err(fail(TokenFault::Unknown));
        };
        if stored.consumed {
            return Err(fail(TokenFault::Consumed));
        }
        if stored.is_expired(Utc::now()) {
            return Err(fail(TokenFault::Expired));
        }
        if !stored.allows_ip(client_ip) {
            return Err(fail(TokenFault::IpNotAllowed));
        }

        Ok(stored)
    }
}
