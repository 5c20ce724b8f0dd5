//! LoRaWAN network-server webhook.

use crate::error::ApiError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use bridge_adapters::UplinkEnvelope;
use bridge_types::BridgeError;
use std::sync::Arc;
use tracing::warn;

/// `POST /integrations/lorawan/webhook`
///
/// When a per-integration secret is configured, `x-signature` must be the
/// HMAC-SHA256 hex of the raw body keyed by that secret; mismatches are
/// rejected with 401 before the body is even parsed.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let raw = String::from_utf8_lossy(&body);
        if !bridge_crypto::verify(secret, &raw, signature) {
            warn!("lorawan webhook signature mismatch");
            return Err(BridgeError::Auth("invalid webhook signature".into()).into());
        }
    }

    let envelope: UplinkEnvelope = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::validation("body", e.to_string()))?;
    state.lorawan.handle_uplink(envelope).await?;

    Ok(StatusCode::NO_CONTENT)
}
