//! # Serial Adapter
//!
//! Newline-delimited JSON frames over any byte link. The host process opens
//! the actual port (USB serial, RS-485 bridge) and injects it; tests inject
//! a `tokio::io::duplex` pair.

use crate::frame::{encode_frame, route_inbound_frame};
use crate::pending::AckWaiters;
use crate::DEFAULT_ACK_WAIT_MS;
use async_trait::async_trait;
use bridge_bus::BusPublisher;
use bridge_types::{
    Ack, AdapterInitError, BridgeAdapter, BridgeMessage, Command, DeliveryError, Telemetry,
    Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, WriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Byte link the adapter frames over.
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> SerialLink for T {}

type BoxedLink = Box<dyn SerialLink>;

/// Serial transport adapter.
pub struct SerialAdapter {
    bus: Arc<dyn BusPublisher>,
    waiters: Arc<AckWaiters>,
    ack_wait: Duration,
    /// Link waiting to be split on init.
    link: Mutex<Option<BoxedLink>>,
    writer: Mutex<Option<WriteHalf<BoxedLink>>>,
}

impl SerialAdapter {
    /// Wrap an open serial link.
    #[must_use]
    pub fn new(link: impl SerialLink, bus: Arc<dyn BusPublisher>) -> Self {
        Self {
            bus,
            waiters: Arc::new(AckWaiters::new()),
            ack_wait: Duration::from_millis(DEFAULT_ACK_WAIT_MS),
            link: Mutex::new(Some(Box::new(link))),
            writer: Mutex::new(None),
        }
    }

    /// Override the ack wait window.
    #[must_use]
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = ack_wait;
        self
    }

    async fn write_line(&self, message: &BridgeMessage) -> Result<(), DeliveryError> {
        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| DeliveryError::new(Transport::Serial, "adapter not initialized"))?;

        let mut line = encode_frame(message);
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| DeliveryError::new(Transport::Serial, e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| DeliveryError::new(Transport::Serial, e.to_string()))
    }
}

#[async_trait]
impl BridgeAdapter for SerialAdapter {
    fn transport(&self) -> Transport {
        Transport::Serial
    }

    async fn init(&self) -> Result<(), AdapterInitError> {
        let Some(link) = self.link.lock().await.take() else {
            // Already split; init is idempotent.
            return Ok(());
        };

        let (read_half, write_half) = tokio::io::split(link);
        *self.writer.lock().await = Some(write_half);

        let bus = Arc::clone(&self.bus);
        let waiters = Arc::clone(&self.waiters);
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        route_inbound_frame(&*bus, &waiters, trimmed.as_bytes()).await;
                    }
                    Ok(None) => {
                        debug!("serial link closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "serial read error");
                        break;
                    }
                }
            }
        });

        info!("serial adapter initialized");
        Ok(())
    }

    async fn publish_telemetry(&self, telemetry: Telemetry) -> Result<(), DeliveryError> {
        self.write_line(&BridgeMessage::Telemetry(telemetry)).await
    }

    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
        let ack_rx = self.waiters.register(command.command_id);
        let command_id = command.command_id;
        let device_id = command.device_id.clone();

        if let Err(e) = self.write_line(&BridgeMessage::Command(command)).await {
            self.waiters.cancel(command_id);
            return Err(e);
        }

        match tokio::time::timeout(self.ack_wait, ack_rx).await {
            Ok(Ok(ack)) => Ok(ack),
            _ => {
                self.waiters.cancel(command_id);
                Ok(Ack::success(device_id, command_id)
                    .with_message("written, no device ack within wait window"))
            }
        }
    }
}
