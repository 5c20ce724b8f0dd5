//! Gateway configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Gateway settings. Field defaults suit local development; the binary
/// overrides them from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Socket the HTTP server binds.
    pub bind_addr: SocketAddr,
    /// Public URL devices are told to reach, embedded in setup payloads.
    pub server_url: String,
    /// Transport hint embedded in setup payloads.
    pub default_protocol: String,
    /// Shared secret for the LoRaWAN webhook; unset disables the check.
    pub webhook_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 8080).into(),
            server_url: "http://localhost:8080".to_owned(),
            default_protocol: "http".to_owned(),
            webhook_secret: None,
        }
    }
}

impl GatewayConfig {
    /// Environment overrides: `BRIDGE_BIND`, `BRIDGE_SERVER_URL`,
    /// `BRIDGE_PROTOCOL`, `BRIDGE_WEBHOOK_SECRET`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bind) = std::env::var("BRIDGE_BIND") {
            if let Ok(addr) = bind.parse() {
                config.bind_addr = addr;
            }
        }
        if let Ok(url) = std::env::var("BRIDGE_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(protocol) = std::env::var("BRIDGE_PROTOCOL") {
            config.default_protocol = protocol;
        }
        if let Ok(secret) = std::env::var("BRIDGE_WEBHOOK_SECRET") {
            if !secret.is_empty() {
                config.webhook_secret = Some(secret);
            }
        }
        config
    }
}
