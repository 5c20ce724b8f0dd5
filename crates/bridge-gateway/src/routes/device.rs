//! Device-facing endpoints: signed telemetry ingest, command polling, acks.

use crate::error::ApiError;
use crate::routes::header_map;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use bridge_bus::BusPublisher;
use bridge_security::AuthContext;
use bridge_types::{Ack, BridgeError, BridgeMessage, Command, Telemetry};
use std::sync::Arc;
use tracing::debug;

async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<AuthContext, BridgeError> {
    let body = std::str::from_utf8(body)
        .map_err(|_| BridgeError::validation("body", "not valid utf-8"))?;
    state
        .authenticator
        .authenticate(&header_map(headers), body, None)
        .await
}

fn admit(state: &AppState, ctx: &AuthContext) -> Result<(), BridgeError> {
    // Coarse tenant bucket first, then the tighter per-device bucket.
    let tenant_key = format!("tenant:{}", ctx.tenant_id);
    if !state.tenant_limiter.consume(&tenant_key) {
        return Err(BridgeError::RateLimitExceeded { key: tenant_key });
    }
    let device_key = format!("device:{}:{}", ctx.tenant_id, ctx.device_id);
    if !state.device_limiter.consume(&device_key) {
        return Err(BridgeError::RateLimitExceeded { key: device_key });
    }
    Ok(())
}

/// `POST /device/telemetry` - authenticate, rate limit, validate, publish.
pub async fn ingest_telemetry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let ctx = authenticate(&state, &headers, &body).await?;
    admit(&state, &ctx)?;

    let telemetry: Telemetry = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::validation("body", e.to_string()))?;
    if telemetry.device_id != ctx.device_id {
        return Err(BridgeError::validation(
            "device_id",
            "body device does not match authenticated device",
        )
        .into());
    }
    telemetry.validate()?;

    state.bus.publish(BridgeMessage::Telemetry(telemetry)).await;
    state.provisioning.touch(&ctx.device_id).await?;

    Ok(StatusCode::ACCEPTED)
}

/// `GET /device/commands/{device_id}` - pending commands, oldest first.
///
/// Returned commands move to `sent`; the device reports their outcome via
/// `POST /device/ack`.
pub async fn poll_commands(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Command>>, ApiError> {
    let ctx = authenticate(&state, &headers, b"").await?;
    if ctx.device_id != device_id {
        return Err(BridgeError::Auth("cannot poll another device's queue".into()).into());
    }
    admit(&state, &ctx)?;

    let pending = state.command_log.pending_for(&device_id);
    for command in &pending {
        state.command_log.mark_sent(command.command_id);
    }
    debug!(device_id = %device_id, count = pending.len(), "commands handed to polling device");

    state.provisioning.touch(&device_id).await?;
    Ok(Json(pending))
}

/// `POST /device/ack` - device reports a command outcome.
pub async fn report_ack(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let ctx = authenticate(&state, &headers, &body).await?;

    let ack: Ack = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::validation("body", e.to_string()))?;
    if ack.device_id != ctx.device_id {
        return Err(BridgeError::validation(
            "device_id",
            "ack device does not match authenticated device",
        )
        .into());
    }

    state.command_log.mark_acknowledged(&ack);
    state.bus.publish(BridgeMessage::Ack(ack)).await;
    state.provisioning.touch(&ctx.device_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
