//! # BLE Adapter
//!
//! GATT framing: telemetry and acks arrive as notifications on one
//! characteristic, commands are written to another. Payloads are the same
//! JSON frames the other framed transports use; BLE MTU negotiation is the
//! link's concern, not the adapter's.
//!
//! The radio itself sits behind [`GattLink`]; a `btleplug`-backed link is
//! available behind the `ble-hw` feature.

use crate::frame::{encode_frame, route_inbound_frame};
use crate::pending::AckWaiters;
use crate::DEFAULT_ACK_WAIT_MS;
use async_trait::async_trait;
use bridge_bus::BusPublisher;
use bridge_types::{
    Ack, AdapterInitError, BridgeAdapter, BridgeMessage, Command, DeliveryError, Telemetry,
    Transport,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Port to a connected GATT peripheral.
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Connect and subscribe to the notify characteristic.
    async fn connect(&self) -> Result<(), AdapterInitError>;

    /// Write one frame to the command characteristic.
    async fn write_frame(&self, payload: &[u8]) -> Result<(), DeliveryError>;

    /// Stream of notification payloads.
    async fn notifications(&self) -> Result<mpsc::Receiver<Vec<u8>>, AdapterInitError>;
}

/// BLE adapter configuration.
#[derive(Debug, Clone)]
pub struct BleAdapterConfig {
    pub ack_wait: Duration,
}

impl Default for BleAdapterConfig {
    fn default() -> Self {
        Self {
            ack_wait: Duration::from_millis(DEFAULT_ACK_WAIT_MS),
        }
    }
}

/// BLE transport adapter.
pub struct BleAdapter {
    config: BleAdapterConfig,
    link: Arc<dyn GattLink>,
    bus: Arc<dyn BusPublisher>,
    waiters: Arc<AckWaiters>,
    started: AtomicBool,
}

impl BleAdapter {
    #[must_use]
    pub fn new(link: Arc<dyn GattLink>, bus: Arc<dyn BusPublisher>) -> Self {
        Self {
            config: BleAdapterConfig::default(),
            link,
            bus,
            waiters: Arc::new(AckWaiters::new()),
            started: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: BleAdapterConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl BridgeAdapter for BleAdapter {
    fn transport(&self) -> Transport {
        Transport::Ble
    }

    async fn init(&self) -> Result<(), AdapterInitError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.link.connect().await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        let mut notifications = match self.link.notifications().await {
            Ok(rx) => rx,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let bus = Arc::clone(&self.bus);
        let waiters = Arc::clone(&self.waiters);
        tokio::spawn(async move {
            while let Some(payload) = notifications.recv().await {
                route_inbound_frame(&*bus, &waiters, &payload).await;
            }
            warn!("ble notification stream ended");
        });

        info!("ble adapter initialized");
        Ok(())
    }

    async fn publish_telemetry(&self, telemetry: Telemetry) -> Result<(), DeliveryError> {
        let frame = encode_frame(&BridgeMessage::Telemetry(telemetry));
        self.link.write_frame(frame.as_bytes()).await
    }

    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
        let ack_rx = self.waiters.register(command.command_id);
        let command_id = command.command_id;
        let device_id = command.device_id.clone();

        let frame = encode_frame(&BridgeMessage::Command(command));
        if let Err(e) = self.link.write_frame(frame.as_bytes()).await {
            self.waiters.cancel(command_id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.ack_wait, ack_rx).await {
            Ok(Ok(ack)) => Ok(ack),
            _ => {
                self.waiters.cancel(command_id);
                Ok(Ack::success(device_id, command_id)
                    .with_message("written, no device ack within wait window"))
            }
        }
    }
}

/// btleplug-backed [`GattLink`].
#[cfg(feature = "ble-hw")]
pub mod hw {
    use super::GattLink;
    use async_trait::async_trait;
    use bridge_types::{AdapterInitError, DeliveryError, Transport};
    use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter, WriteType};
    use btleplug::platform::{Manager, Peripheral};
    use futures_util::StreamExt;
    use std::time::Duration;
    use tokio::sync::{mpsc, Mutex};
    use uuid::Uuid;

    /// GATT link over a btleplug peripheral.
    pub struct BtleplugLink {
        service_uuid: Uuid,
        notify_char: Uuid,
        write_char: Uuid,
        scan_window: Duration,
        peripheral: Mutex<Option<Peripheral>>,
    }

    impl BtleplugLink {
        #[must_use]
        pub fn new(service_uuid: Uuid, notify_char: Uuid, write_char: Uuid) -> Self {
            Self {
                service_uuid,
                notify_char,
                write_char,
                scan_window: Duration::from_secs(10),
                peripheral: Mutex::new(None),
            }
        }

        fn unreachable(message: impl Into<String>) -> AdapterInitError {
            AdapterInitError::Unreachable {
                transport: Transport::Ble,
                message: message.into(),
            }
        }
    }

    #[async_trait]
    impl GattLink for BtleplugLink {
        async fn connect(&self) -> Result<(), AdapterInitError> {
            let manager = Manager::new()
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;
            let adapters = manager
                .adapters()
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;
            let central = adapters
                .into_iter()
                .next()
                .ok_or_else(|| Self::unreachable("no bluetooth adapter"))?;

            central
                .start_scan(ScanFilter {
                    services: vec![self.service_uuid],
                })
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;
            tokio::time::sleep(self.scan_window).await;

            let peripherals = central
                .peripherals()
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;
            let peripheral = peripherals
                .into_iter()
                .next()
                .ok_or_else(|| Self::unreachable("peripheral not found"))?;

            peripheral
                .connect()
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;
            peripheral
                .discover_services()
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;

            let notify = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == self.notify_char)
                .ok_or_else(|| Self::unreachable("notify characteristic missing"))?;
            peripheral
                .subscribe(&notify)
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;

            *self.peripheral.lock().await = Some(peripheral);
            Ok(())
        }

        async fn write_frame(&self, payload: &[u8]) -> Result<(), DeliveryError> {
            let guard = self.peripheral.lock().await;
            let peripheral = guard
                .as_ref()
                .ok_or_else(|| DeliveryError::new(Transport::Ble, "link not connected"))?;
            let characteristic = peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == self.write_char)
                .ok_or_else(|| DeliveryError::new(Transport::Ble, "write characteristic missing"))?;
            peripheral
                .write(&characteristic, payload, WriteType::WithoutResponse)
                .await
                .map_err(|e| DeliveryError::new(Transport::Ble, e.to_string()))
        }

        async fn notifications(&self) -> Result<mpsc::Receiver<Vec<u8>>, AdapterInitError> {
            let guard = self.peripheral.lock().await;
            let peripheral = guard
                .as_ref()
                .ok_or_else(|| Self::unreachable("link not connected"))?
                .clone();
            drop(guard);

            let mut stream = peripheral
                .notifications()
                .await
                .map_err(|e| Self::unreachable(e.to_string()))?;

            let (tx, rx) = mpsc::channel(64);
            tokio::spawn(async move {
                while let Some(notification) = stream.next().await {
                    if tx.send(notification.value).await.is_err() {
                        break;
                    }
                }
            });
            Ok(rx)
        }
    }
}
