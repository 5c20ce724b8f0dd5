//! Route table.

pub mod device;
pub mod lorawan;
pub mod provisioning;

use crate::state::AppState;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the gateway router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/provisioning/claim", post(provisioning::claim))
        .route("/provisioning/bind", post(provisioning::bind))
        .route("/provisioning/rotate", post(provisioning::rotate))
        .route("/device/telemetry", post(device::ingest_telemetry))
        .route("/device/commands/:device_id", get(device::poll_commands))
        .route("/device/ack", post(device::report_ack))
        .route("/integrations/lorawan/webhook", post(lorawan::webhook))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Lowercased header map for the authenticator.
pub(crate) fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
        })
        .collect()
}
