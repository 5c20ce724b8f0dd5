//! # HTTP Adapter
//!
//! Signed HTTP push. Telemetry and commands go out as JSON POSTs carrying
//! the device auth headers; the signature covers the raw body concatenated
//! with the timestamp.

use async_trait::async_trait;
use bridge_crypto::{current_timestamp_ms, sign_request};
use bridge_security::{HEADER_DEVICE_ID, HEADER_SIGNATURE, HEADER_TENANT_ID, HEADER_TIMESTAMP};
use bridge_types::{
    Ack, AdapterInitError, BridgeAdapter, Command, DeliveryError, Telemetry, Transport,
};
use std::time::Duration;
use tracing::{debug, info};

/// HTTP adapter configuration.
#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    /// Peer base URL, e.g. `https://bridge.example.com` or a device's local
    /// endpoint.
    pub base_url: String,
    pub tenant_id: String,
    pub device_id: String,
    /// Key used to sign outgoing requests.
    pub device_key: String,
    pub request_timeout: Duration,
}

impl HttpAdapterConfig {
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        tenant_id: impl Into<String>,
        device_id: impl Into<String>,
        device_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            tenant_id: tenant_id.into(),
            device_id: device_id.into(),
            device_key: device_key.into(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// The four signature headers for a body at a timestamp.
#[must_use]
pub fn signed_headers(
    config: &HttpAdapterConfig,
    body: &str,
    timestamp_ms: i64,
) -> [(&'static str, String); 4] {
    [
        (HEADER_DEVICE_ID, config.device_id.clone()),
        (HEADER_TENANT_ID, config.tenant_id.clone()),
        (HEADER_TIMESTAMP, timestamp_ms.to_string()),
        (
            HEADER_SIGNATURE,
            sign_request(&config.device_key, body, timestamp_ms),
        ),
    ]
}

/// HTTP transport adapter.
pub struct HttpAdapter {
    config: HttpAdapterConfig,
    client: reqwest::Client,
}

impl HttpAdapter {
    #[must_use]
    pub fn new(config: HttpAdapterConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    async fn signed_post(&self, path: &str, body: String) -> Result<reqwest::Response, DeliveryError> {
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).body(body.clone());
        for (name, value) in signed_headers(&self.config, &body, current_timestamp_ms()) {
            request = request.header(name, value);
        }
        request = request.header("content-type", "application/json");

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::new(Transport::Http, e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeliveryError::new(
                Transport::Http,
                format!("peer returned {}", response.status()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl BridgeAdapter for HttpAdapter {
    fn transport(&self) -> Transport {
        Transport::Http
    }

    async fn init(&self) -> Result<(), AdapterInitError> {
        // HTTP is connectionless; init just proves the peer answers.
        let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(_) => {
                info!(base_url = %self.config.base_url, "http adapter ready");
                Ok(())
            }
            Err(e) => Err(AdapterInitError::Unreachable {
                transport: Transport::Http,
                message: e.to_string(),
            }),
        }
    }

    async fn publish_telemetry(&self, telemetry: Telemetry) -> Result<(), DeliveryError> {
        let body = serde_json::to_string(&telemetry)
            .map_err(|e| DeliveryError::new(Transport::Http, e.to_string()))?;
        self.signed_post("/device/telemetry", body).await?;
        debug!(device_id = %telemetry.device_id, "telemetry pushed over http");
        Ok(())
    }

    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
        let body = serde_json::to_string(&command)
            .map_err(|e| DeliveryError::new(Transport::Http, e.to_string()))?;
        let response = self.signed_post("/device/command", body).await?;

        // The peer answers with the device's ack.
        response
            .json::<Ack>()
            .await
            .map_err(|e| DeliveryError::new(Transport::Http, format!("unparseable ack: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_crypto::verify_request_at;

    fn config() -> HttpAdapterConfig {
        HttpAdapterConfig::new(
            "https://bridge.example.com/",
            "tenant-a",
            "dev-1",
            "DK_test",
        )
    }

    #[test]
    fn test_signed_headers_verify() {
        let config = config();
        let body = r#"{"device_id":"dev-1"}"#;
        let now = current_timestamp_ms();

        let headers = signed_headers(&config, body, now);
        let signature = &headers
            .iter()
            .find(|(name, _)| *name == HEADER_SIGNATURE)
            .unwrap()
            .1;

        assert!(verify_request_at("DK_test", body, now, signature, now));
    }

    #[test]
    fn test_signed_headers_carry_identity() {
        let headers = signed_headers(&config(), "{}", 1234);
        assert!(headers.contains(&(HEADER_DEVICE_ID, "dev-1".to_owned())));
        assert!(headers.contains(&(HEADER_TENANT_ID, "tenant-a".to_owned())));
        assert!(headers.contains(&(HEADER_TIMESTAMP, "1234".to_owned())));
    }
}
