//! Provisioning API: claim, bind, rotate.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use bridge_provisioning::{BindRequest, ClaimRequest, RotateRequest};
use bridge_types::SetupPayload;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Scannable payload for the admin UI's QR code.
    pub setup: SetupPayload,
}

/// `POST /provisioning/claim`
pub async fn claim(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let token = state.provisioning.claim(req).await?;
    let setup = state.provisioning.setup_payload(
        &token,
        &state.config.server_url,
        &state.config.default_protocol,
    );
    Ok(Json(ClaimResponse {
        token: token.token.clone(),
        expires_at: token.expires_at,
        setup,
    }))
}

#[derive(Debug, Serialize)]
pub struct BindResponse {
    pub device_key: String,
    pub tenant_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm_id: Option<String>,
}

/// `POST /provisioning/bind`
pub async fn bind(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BindRequest>,
) -> Result<Json<BindResponse>, ApiError> {
    let binding = state.provisioning.bind(req).await?;
    Ok(Json(BindResponse {
        device_key: binding.device_key.expose().to_owned(),
        tenant_id: binding.tenant_id,
        farm_id: binding.farm_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct RotateResponse {
    pub new_key: String,
    /// Grace window length in seconds.
    pub grace_period: u64,
    pub expires_at: DateTime<Utc>,
}

/// `POST /provisioning/rotate`
pub async fn rotate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RotateRequest>,
) -> Result<Json<RotateResponse>, ApiError> {
    let rotation = state.provisioning.rotate(req).await?;
    Ok(Json(RotateResponse {
        new_key: rotation.new_key.expose().to_owned(),
        grace_period: rotation.grace_period_secs,
        expires_at: rotation.expires_at,
    }))
}
