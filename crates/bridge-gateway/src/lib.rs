//! # Bridge Gateway - HTTP Surface
//!
//! The external interfaces of the bridge core:
//!
//! - **Provisioning API** (admin tooling / mobile client): claim, bind,
//!   rotate
//! - **Device endpoints**: signed telemetry ingest, command polling, acks
//! - **Integrations**: LoRaWAN network-server webhook with body HMAC
//!
//! The device ingest path applies checks in order: authenticate -> rate
//! limit (tenant, then device) -> validate -> publish. Failures return the
//! structured error object (`{"error": {"kind", "message"}}`).

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
