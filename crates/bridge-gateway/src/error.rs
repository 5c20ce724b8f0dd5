//! HTTP mapping for the bridge error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bridge_types::{BridgeError, ErrorBody, TokenFault};
use serde_json::json;

/// A [`BridgeError`] presented as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            BridgeError::Auth(_) => StatusCode::UNAUTHORIZED,
            BridgeError::TokenInvalid { fault } => match fault {
                TokenFault::Unknown => StatusCode::NOT_FOUND,
                TokenFault::IpNotAllowed => StatusCode::FORBIDDEN,
                TokenFault::Malformed => StatusCode::UNPROCESSABLE_ENTITY,
                TokenFault::Consumed | TokenFault::Expired => StatusCode::GONE,
            },
            BridgeError::KeyInvalid { .. } | BridgeError::TenantMismatch { .. } => {
                StatusCode::FORBIDDEN
            }
            BridgeError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BridgeError::Delivery { .. } => StatusCode::BAD_GATEWAY,
            BridgeError::RetryExhausted { .. } => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self.0);
        (self.status(), Json(json!({ "error": body }))).into_response()
    }
}
