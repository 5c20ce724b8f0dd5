//! # WebSocket Adapter
//!
//! Real-time bidirectional transport. Frames are JSON texts of the tagged
//! message union; a writer task owns the sink and a reader task routes
//! inbound frames onto the bus.

use crate::frame::{encode_frame, route_inbound_frame};
use crate::pending::AckWaiters;
use crate::DEFAULT_ACK_WAIT_MS;
use async_trait::async_trait;
use bridge_bus::BusPublisher;
use bridge_types::{
    Ack, AdapterInitError, BridgeAdapter, BridgeMessage, Command, DeliveryError, Telemetry,
    Transport,
};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket adapter configuration.
#[derive(Debug, Clone)]
pub struct WebSocketAdapterConfig {
    /// Peer URL, e.g. `wss://bridge.example.com/ws`.
    pub url: String,
    pub ping_interval: Duration,
    pub ack_wait: Duration,
}

impl WebSocketAdapterConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ping_interval: Duration::from_secs(30),
            ack_wait: Duration::from_millis(DEFAULT_ACK_WAIT_MS),
        }
    }
}

/// WebSocket transport adapter.
pub struct WebSocketAdapter {
    config: WebSocketAdapterConfig,
    bus: Arc<dyn BusPublisher>,
    waiters: Arc<AckWaiters>,
    writer: Arc<Mutex<Option<WsSink>>>,
}

impl WebSocketAdapter {
    #[must_use]
    pub fn new(config: WebSocketAdapterConfig, bus: Arc<dyn BusPublisher>) -> Self {
        Self {
            config,
            bus,
            waiters: Arc::new(AckWaiters::new()),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    async fn send_frame(&self, message: &BridgeMessage) -> Result<(), DeliveryError> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| DeliveryError::new(Transport::WebSocket, "adapter not initialized"))?;
        sink.send(Message::Text(encode_frame(message)))
            .await
            .map_err(|e| DeliveryError::new(Transport::WebSocket, e.to_string()))
    }
}

#[async_trait]
impl BridgeAdapter for WebSocketAdapter {
    fn transport(&self) -> Transport {
        Transport::WebSocket
    }

    async fn init(&self) -> Result<(), AdapterInitError> {
        let mut writer = self.writer.lock().await;
        if writer.is_some() {
            return Ok(());
        }

        let (stream, _response) =
            connect_async(self.config.url.as_str())
                .await
                .map_err(|e| AdapterInitError::Unreachable {
                    transport: Transport::WebSocket,
                    message: e.to_string(),
                })?;
        info!(url = %self.config.url, "websocket adapter connected");

        let (sink, mut source) = stream.split();
        *writer = Some(sink);

        // Reader task: route inbound frames, drop undecodable ones.
        let bus = Arc::clone(&self.bus);
        let waiters = Arc::clone(&self.waiters);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        route_inbound_frame(&*bus, &waiters, text.as_bytes()).await;
                    }
                    Ok(Message::Binary(bytes)) => {
                        route_inbound_frame(&*bus, &waiters, &bytes).await;
                    }
                    Ok(Message::Close(_)) => {
                        debug!("websocket closed by peer");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
        });

        // Keepalive task: ping on an interval until the writer goes away.
        let ping_writer = Arc::clone(&self.writer);
        let ping_interval = self.config.ping_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ping_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let mut guard = ping_writer.lock().await;
                let Some(sink) = guard.as_mut() else { break };
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    debug!("websocket ping failed, stopping keepalive");
                    break;
                }
            }
        });

        Ok(())
    }

    async fn publish_telemetry(&self, telemetry: Telemetry) -> Result<(), DeliveryError> {
        self.send_frame(&BridgeMessage::Telemetry(telemetry)).await
    }

    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
        let ack_rx = self.waiters.register(command.command_id);
        let command_id = command.command_id;
        let device_id = command.device_id.clone();

        if let Err(e) = self.send_frame(&BridgeMessage::Command(command)).await {
            self.waiters.cancel(command_id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.ack_wait, ack_rx).await {
            Ok(Ok(ack)) => Ok(ack),
            _ => {
                self.waiters.cancel(command_id);
                Ok(Ack::success(device_id, command_id)
                    .with_message("sent, no device ack within wait window"))
            }
        }
    }
}
