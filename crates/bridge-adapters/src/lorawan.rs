//! # LoRaWAN Adapter
//!
//! Uplink-only transport fed by network-server webhooks (The Things Stack or
//! ChirpStack envelope shapes). This is the one adapter that owns a binary
//! codec step: base64 uplink payload -> bytes -> injected decode function ->
//! metric map. Downlinks are queued to the network server's HTTP API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bridge_bus::BusPublisher;
use bridge_types::{
    Ack, AdapterInitError, BridgeAdapter, BridgeError, BridgeMessage, Command, DeliveryError,
    MetricValue, StatusTag, Telemetry, Transport,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decodes raw uplink payload bytes into the telemetry metric map.
///
/// Injected per device fleet or application; vendor payload layouts vary too
/// much for anything built in.
pub type UplinkDecoder =
    dyn Fn(&[u8]) -> Result<BTreeMap<String, MetricValue>, BridgeError> + Send + Sync;

/// Downlink queueing endpoint on the network server.
#[derive(Debug, Clone)]
pub struct DownlinkHttp {
    /// e.g. `https://lns.example.com/api`
    pub base_url: String,
    /// Authorization header value.
    pub token: String,
}

/// LoRaWAN adapter configuration.
#[derive(Clone)]
pub struct LoraWanConfig {
    /// DevEUI -> bridge device id. Unmapped DevEUIs pass through as ids.
    pub device_map: HashMap<String, String>,
    /// Downlink target; uplink-only integrations leave it unset.
    pub downlink: Option<DownlinkHttp>,
    /// Default FPort for downlinks when the command names none.
    pub default_f_port: u8,
}

impl Default for LoraWanConfig {
    fn default() -> Self {
        Self {
            device_map: HashMap::new(),
            downlink: None,
            default_f_port: 10,
        }
    }
}

/// Network-server uplink envelope.
///
/// Accepts both The Things Stack (`end_device_ids`/`uplink_message`) and
/// ChirpStack (`device_info`/`data`) field shapes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UplinkEnvelope {
    #[serde(default)]
    pub dev_eui: Option<String>,
    #[serde(default)]
    pub end_device_ids: Option<EndDeviceIds>,
    #[serde(default)]
    pub device_info: Option<DeviceInfo>,
    /// ChirpStack: base64 payload.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub uplink_message: Option<UplinkMessage>,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndDeviceIds {
    #[serde(default)]
    pub dev_eui: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub dev_eui: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UplinkMessage {
    #[serde(default)]
    pub frm_payload: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl UplinkEnvelope {
    fn dev_eui(&self) -> Option<&str> {
        self.dev_eui
            .as_deref()
            .or_else(|| self.end_device_ids.as_ref().and_then(|e| e.dev_eui.as_deref()))
            .or_else(|| self.device_info.as_ref().and_then(|d| d.dev_eui.as_deref()))
    }

    fn payload_b64(&self) -> Option<&str> {
        self.data
            .as_deref()
            .or_else(|| self.uplink_message.as_ref().and_then(|u| u.frm_payload.as_deref()))
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.time
            .or(self.received_at)
            .or_else(|| self.uplink_message.as_ref().and_then(|u| u.received_at))
            .unwrap_or_else(Utc::now)
    }
}

/// LoRaWAN transport adapter.
pub struct LoraWanAdapter {
    config: LoraWanConfig,
    bus: Arc<dyn BusPublisher>,
    decoder: Arc<UplinkDecoder>,
    http: reqwest::Client,
}

impl LoraWanAdapter {
    /// Adapter with the stock decoder, which reports only the payload size.
    #[must_use]
    pub fn new(config: LoraWanConfig, bus: Arc<dyn BusPublisher>) -> Self {
        Self::with_decoder(
            config,
            bus,
            Arc::new(|bytes: &[u8]| {
                let mut metrics = BTreeMap::new();
                metrics.insert(
                    "payload_size".to_owned(),
                    MetricValue::Number(bytes.len() as f64),
                );
                Ok(metrics)
            }),
        )
    }

    /// Adapter with an application-specific payload decoder.
    #[must_use]
    pub fn with_decoder(
        config: LoraWanConfig,
        bus: Arc<dyn BusPublisher>,
        decoder: Arc<UplinkDecoder>,
    ) -> Self {
        Self {
            config,
            bus,
            decoder,
            http: reqwest::Client::new(),
        }
    }

    /// Decode one uplink envelope and admit it onto the bus.
    ///
    /// Called by the gateway's webhook route after the signature check.
    pub async fn handle_uplink(&self, envelope: UplinkEnvelope) -> Result<(), BridgeError> {
        let dev_eui = envelope.dev_eui().unwrap_or("unknown").to_owned();
        let device_id = self
            .config
            .device_map
            .get(&dev_eui)
            .cloned()
            .unwrap_or_else(|| dev_eui.clone());

        let bytes = match envelope.payload_b64() {
            Some(b64) => BASE64
                .decode(b64)
                .map_err(|e| BridgeError::validation("frm_payload", e.to_string()))?,
            None => Vec::new(),
        };

        let metrics = (self.decoder)(&bytes)?;
        let telemetry = Telemetry {
            device_id: device_id.clone(),
            ts: envelope.timestamp(),
            metrics,
            status: Some(StatusTag::Ok),
        };
        telemetry.validate()?;

        debug!(dev_eui = %dev_eui, device_id = %device_id, bytes = bytes.len(), "lorawan uplink decoded");
        self.bus.publish(BridgeMessage::Telemetry(telemetry)).await;
        Ok(())
    }
}

#[async_trait]
impl BridgeAdapter for LoraWanAdapter {
    fn transport(&self) -> Transport {
        Transport::Webhook
    }

    async fn init(&self) -> Result<(), AdapterInitError> {
        // Webhook-fed: nothing to connect. Downlink reachability is checked
        // per send, as the network server may come and go.
        info!(
            mapped_devices = self.config.device_map.len(),
            downlink = self.config.downlink.is_some(),
            "lorawan adapter ready"
        );
        Ok(())
    }

    /// Uplink-only transport: nothing to publish outward.
    async fn publish_telemetry(&self, _telemetry: Telemetry) -> Result<(), DeliveryError> {
        Ok(())
    }

    /// Queue a downlink: `params.bytes` (byte array) on `params.port`.
    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
        let Some(downlink) = &self.config.downlink else {
            return Err(DeliveryError::new(
                Transport::Webhook,
                "no downlink target configured",
            ));
        };

        let port = command
            .params
            .get("port")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(u64::from(self.config.default_f_port));
        let bytes: Vec<u8> = command
            .params
            .get("bytes")
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(serde_json::Value::as_u64)
                    .map(|b| b as u8)
                    .collect()
            })
            .unwrap_or_default();
        let payload = BASE64.encode(bytes);

        let url = format!(
            "{}/devices/{}/queue",
            downlink.base_url.trim_end_matches('/'),
            command.device_id
        );
        let body = json!({
            "deviceQueueItem": {
                "fPort": port,
                "data": payload,
                "confirmed": false,
            }
        });

        let response = self
            .http
            .post(&url)
            .header("authorization", &downlink.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::new(Transport::Webhook, e.to_string()))?;

        if response.status().is_success() {
            Ok(Ack::success(command.device_id, command.command_id)
                .with_message("downlink queued"))
        } else {
            warn!(status = %response.status(), device_id = %command.device_id, "downlink rejected");
            Ok(Ack::rejected(
                command.device_id,
                command.command_id,
                "downlink_rejected",
                format!("network server returned {}", response.status()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_bus::{MessageBus, MessageFilter};

    fn tts_envelope(dev_eui: &str, payload: &[u8]) -> UplinkEnvelope {
        serde_json::from_value(json!({
            "end_device_ids": { "dev_eui": dev_eui },
            "received_at": "2026-08-07T10:00:00Z",
            "uplink_message": { "frm_payload": BASE64.encode(payload) }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_uplink_with_stock_decoder() {
        let bus = Arc::new(MessageBus::new());
        let mut sub = bus.subscribe(MessageFilter::all());
        let adapter = LoraWanAdapter::new(LoraWanConfig::default(), bus);

        adapter
            .handle_uplink(tts_envelope("70B3D57ED0000001", &[1, 2, 3, 4]))
            .await
            .unwrap();

        let Some(BridgeMessage::Telemetry(t)) = sub.recv().await else {
            panic!("expected telemetry");
        };
        assert_eq!(t.device_id, "70B3D57ED0000001");
        assert_eq!(t.metrics["payload_size"].as_number(), Some(4.0));
    }

    #[tokio::test]
    async fn test_uplink_with_custom_decoder_and_device_map() {
        let bus = Arc::new(MessageBus::new());
        let mut sub = bus.subscribe(MessageFilter::all());

        let mut config = LoraWanConfig::default();
        config
            .device_map
            .insert("70B3D57ED0000001".to_owned(), "greenhouse-7".to_owned());

        // Two big-endian u16s: temperature (x10) and humidity (x10).
        let decoder: Arc<UplinkDecoder> = Arc::new(|bytes: &[u8]| {
            if bytes.len() != 4 {
                return Err(BridgeError::validation("payload", "expected 4 bytes"));
            }
            let temp = f64::from(u16::from_be_bytes([bytes[0], bytes[1]])) / 10.0;
            let humidity = f64::from(u16::from_be_bytes([bytes[2], bytes[3]])) / 10.0;
            let mut metrics = BTreeMap::new();
            metrics.insert("temp_c".to_owned(), MetricValue::Number(temp));
            metrics.insert("humidity".to_owned(), MetricValue::Number(humidity));
            Ok(metrics)
        });
        let adapter = LoraWanAdapter::with_decoder(config, bus, decoder);

        // 21.5 C, 64.0 %
        adapter
            .handle_uplink(tts_envelope("70B3D57ED0000001", &[0, 215, 2, 128]))
            .await
            .unwrap();

        let Some(BridgeMessage::Telemetry(t)) = sub.recv().await else {
            panic!("expected telemetry");
        };
        assert_eq!(t.device_id, "greenhouse-7");
        assert_eq!(t.metrics["temp_c"].as_number(), Some(21.5));
        assert_eq!(t.metrics["humidity"].as_number(), Some(64.0));
    }

    #[tokio::test]
    async fn test_chirpstack_envelope_shape() {
        let bus = Arc::new(MessageBus::new());
        let mut sub = bus.subscribe(MessageFilter::all());
        let adapter = LoraWanAdapter::new(LoraWanConfig::default(), bus);

        let envelope: UplinkEnvelope = serde_json::from_value(json!({
            "device_info": { "dev_eui": "A84041FFFF000001" },
            "time": "2026-08-07T09:30:00Z",
            "data": BASE64.encode([9u8])
        }))
        .unwrap();
        adapter.handle_uplink(envelope).await.unwrap();

        let Some(BridgeMessage::Telemetry(t)) = sub.recv().await else {
            panic!("expected telemetry");
        };
        assert_eq!(t.device_id, "A84041FFFF000001");
    }

    #[tokio::test]
    async fn test_invalid_base64_rejected() {
        let adapter = LoraWanAdapter::new(LoraWanConfig::default(), Arc::new(MessageBus::new()));
        let envelope: UplinkEnvelope = serde_json::from_value(json!({
            "dev_eui": "X",
            "data": "!!not-base64!!"
        }))
        .unwrap();
        assert!(adapter.handle_uplink(envelope).await.is_err());
    }

    #[tokio::test]
    async fn test_decoder_failure_surfaces_as_validation() {
        let decoder: Arc<UplinkDecoder> =
            Arc::new(|_| Err(BridgeError::validation("payload", "bad layout")));
        let adapter = LoraWanAdapter::with_decoder(
            LoraWanConfig::default(),
            Arc::new(MessageBus::new()),
            decoder,
        );
        let err = adapter
            .handle_uplink(tts_envelope("E", &[1]))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_downlink_without_target_fails() {
        let adapter = LoraWanAdapter::new(LoraWanConfig::default(), Arc::new(MessageBus::new()));
        let err = adapter
            .send_command(Command::new("dev-1", "downlink"))
            .await
            .unwrap_err();
        assert!(err.message.contains("no downlink target"));
    }
}
