//! # MQTT Adapter
//!
//! Pub/sub over an MQTT broker with farm-scoped topic conventions:
//!
//! ```text
//! farm/{farm_id}/telemetry/{device_id}   device -> bridge
//! farm/{farm_id}/commands/{device_id}    bridge -> device
//! farm/{farm_id}/ack/{device_id}         device -> bridge
//! ```

use crate::frame::route_inbound;
use crate::pending::AckWaiters;
use crate::DEFAULT_ACK_WAIT_MS;
use async_trait::async_trait;
use bridge_bus::BusPublisher;
use bridge_types::{
    Ack, AdapterInitError, BridgeAdapter, BridgeMessage, Command, DeliveryError, Telemetry,
    Transport,
};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// MQTT adapter configuration.
#[derive(Debug, Clone)]
pub struct MqttAdapterConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Farm scope for topics; `default` when unset.
    pub farm_id: Option<String>,
    pub keep_alive: Duration,
    /// How long `send_command` waits for the device ack.
    pub ack_wait: Duration,
}

impl MqttAdapterConfig {
    #[must_use]
    pub fn new(broker_host: impl Into<String>, broker_port: u16, client_id: impl Into<String>) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port,
            client_id: client_id.into(),
            username: None,
            password: None,
            farm_id: None,
            keep_alive: Duration::from_secs(60),
            ack_wait: Duration::from_millis(DEFAULT_ACK_WAIT_MS),
        }
    }

    fn farm(&self) -> &str {
        self.farm_id.as_deref().unwrap_or("default")
    }

    fn telemetry_topic(&self, device_id: &str) -> String {
        format!("farm/{}/telemetry/{}", self.farm(), device_id)
    }

    fn command_topic(&self, device_id: &str) -> String {
        format!("farm/{}/commands/{}", self.farm(), device_id)
    }

    fn inbound_subscriptions(&self) -> [String; 2] {
        [
            format!("farm/{}/telemetry/+", self.farm()),
            format!("farm/{}/ack/+", self.farm()),
        ]
    }
}

/// MQTT transport adapter.
pub struct MqttAdapter {
    config: MqttAdapterConfig,
    bus: Arc<dyn BusPublisher>,
    waiters: Arc<AckWaiters>,
    client: Mutex<Option<AsyncClient>>,
}

impl MqttAdapter {
    #[must_use]
    pub fn new(config: MqttAdapterConfig, bus: Arc<dyn BusPublisher>) -> Self {
        Self {
            config,
            bus,
            waiters: Arc::new(AckWaiters::new()),
            client: Mutex::new(None),
        }
    }

    async fn client(&self) -> Result<AsyncClient, DeliveryError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| DeliveryError::new(Transport::Mqtt, "adapter not initialized"))
    }
}

#[async_trait]
impl BridgeAdapter for MqttAdapter {
    fn transport(&self) -> Transport {
        Transport::Mqtt
    }

    async fn init(&self) -> Result<(), AdapterInitError> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            // Already connected; init is idempotent.
            return Ok(());
        }

        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(self.config.keep_alive);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        // Drive the event loop once so an unreachable broker fails init
        // instead of failing silently in the background.
        match eventloop.poll().await {
            Ok(event) => debug!(?event, "mqtt connection established"),
            Err(e) => {
                return Err(AdapterInitError::Unreachable {
                    transport: Transport::Mqtt,
                    message: e.to_string(),
                })
            }
        }

        for topic in self.config.inbound_subscriptions() {
            client
                .subscribe(topic.clone(), QoS::AtLeastOnce)
                .await
                .map_err(|e| AdapterInitError::Unreachable {
                    transport: Transport::Mqtt,
                    message: e.to_string(),
                })?;
            debug!(topic = %topic, "subscribed");
        }

        let bus = Arc::clone(&self.bus);
        let waiters = Arc::clone(&self.waiters);
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_publish(&*bus, &waiters, &publish.topic, &publish.payload).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt event loop error, reconnecting");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!(
            host = %self.config.broker_host,
            port = self.config.broker_port,
            "mqtt adapter connected"
        );
        *guard = Some(client);
        Ok(())
    }

    async fn publish_telemetry(&self, telemetry: Telemetry) -> Result<(), DeliveryError> {
        let client = self.client().await?;
        let topic = self.config.telemetry_topic(&telemetry.device_id);
        let payload = serde_json::to_vec(&telemetry)
            .map_err(|e| DeliveryError::new(Transport::Mqtt, e.to_string()))?;

        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| DeliveryError::new(Transport::Mqtt, e.to_string()))
    }

    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
        let client = self.client().await?;
        let topic = self.config.command_topic(&command.device_id);
        let payload = serde_json::to_vec(&command)
            .map_err(|e| DeliveryError::new(Transport::Mqtt, e.to_string()))?;

        let ack_rx = self.waiters.register(command.command_id);

        if let Err(e) = client.publish(topic, QoS::AtLeastOnce, false, payload).await {
            self.waiters.cancel(command.command_id);
            return Err(DeliveryError::new(Transport::Mqtt, e.to_string()));
        }

        // Bounded wait for the device's ack on its ack topic; delivery
        // without a device result is still a successful delivery.
        match tokio::time::timeout(self.config.ack_wait, ack_rx).await {
            Ok(Ok(ack)) => Ok(ack),
            _ => {
                self.waiters.cancel(command.command_id);
                Ok(Ack::success(command.device_id, command.command_id)
                    .with_message("published, no device ack within wait window"))
            }
        }
    }
}

async fn handle_publish(bus: &dyn BusPublisher, waiters: &AckWaiters, topic: &str, payload: &[u8]) {
    let message = if topic.contains("/telemetry/") {
        serde_json::from_slice::<Telemetry>(payload).map(BridgeMessage::from)
    } else if topic.contains("/ack/") {
        serde_json::from_slice::<Ack>(payload).map(BridgeMessage::from)
    } else {
        debug!(topic = %topic, "ignoring publish on unhandled topic");
        return;
    };

    match message {
        Ok(message) => {
            if let Err(err) = route_inbound(bus, waiters, message).await {
                warn!(topic = %topic, error = %err, "inbound mqtt message rejected");
            }
        }
        Err(err) => warn!(topic = %topic, error = %err, "undecodable mqtt payload dropped"),
    }
}
