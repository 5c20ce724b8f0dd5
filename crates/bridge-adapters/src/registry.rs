//! # Adapter Registry
//!
//! Holds every active transport adapter, fans telemetry out across them with
//! per-adapter failure isolation, and routes commands to the transport a
//! device last spoke on. Implements [`BridgeAdapter`] itself so the
//! dispatcher can treat the whole fleet as one delivery target.

use async_trait::async_trait;
use bridge_types::{
    Ack, AdapterInitError, BridgeAdapter, Command, DeliveryError, DynAdapter, Telemetry, Transport,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{error, info, warn};

/// Registry of active adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<Transport, DynAdapter>,
    /// Registration order; the first adapter is the command fallback.
    order: RwLock<Vec<Transport>>,
    /// Device -> transport the device last spoke on.
    routes: DashMap<String, Transport>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Replaces any previous adapter for the same
    /// transport.
    pub fn register(&self, adapter: DynAdapter) {
        let transport = adapter.transport();
        if self.adapters.insert(transport, adapter).is_none() {
            self.order.write().push(transport);
        }
        info!(transport = %transport, "adapter registered");
    }

    /// The adapter for a transport, if registered.
    #[must_use]
    pub fn adapter_for(&self, transport: Transport) -> Option<DynAdapter> {
        self.adapters.get(&transport).map(|a| a.value().clone())
    }

    /// Remember which transport a device speaks.
    pub fn set_route(&self, device_id: impl Into<String>, transport: Transport) {
        self.routes.insert(device_id.into(), transport);
    }

    /// The transport a device is routed to, if known.
    #[must_use]
    pub fn route_for(&self, device_id: &str) -> Option<Transport> {
        self.routes.get(device_id).map(|t| *t.value())
    }

    /// Initialize every registered adapter; the first failure aborts.
    pub async fn init_all(&self) -> Result<(), AdapterInitError> {
        let transports: Vec<Transport> = self.order.read().clone();
        for transport in transports {
            if let Some(adapter) = self.adapter_for(transport) {
                adapter.init().await?;
                info!(transport = %transport, "adapter initialized");
            }
        }
        Ok(())
    }

    fn command_target(&self, device_id: &str) -> Option<DynAdapter> {
        if let Some(transport) = self.route_for(device_id) {
            if let Some(adapter) = self.adapter_for(transport) {
                return Some(adapter);
            }
        }
        let first = *self.order.read().first()?;
        self.adapter_for(first)
    }
}

#[async_trait]
impl BridgeAdapter for AdapterRegistry {
    fn transport(&self) -> Transport {
        // The registry presents as its first registered transport.
        self.order.read().first().copied().unwrap_or(Transport::Http)
    }

    async fn init(&self) -> Result<(), AdapterInitError> {
        self.init_all().await
    }

    /// Fan out to every adapter. A failing adapter is logged and skipped so
    /// one bad transport cannot suppress the others.
    async fn publish_telemetry(&self, telemetry: Telemetry) -> Result<(), DeliveryError> {
        let transports: Vec<Transport> = self.order.read().clone();
        for transport in transports {
            if let Some(adapter) = self.adapter_for(transport) {
                if let Err(err) = adapter.publish_telemetry(telemetry.clone()).await {
                    error!(
                        transport = %transport,
                        device_id = %telemetry.device_id,
                        error = %err,
                        "telemetry fan-out failed for one adapter"
                    );
                }
            }
        }
        Ok(())
    }

    async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
        let Some(adapter) = self.command_target(&command.device_id) else {
            warn!(device_id = %command.device_id, "no adapter available for command");
            return Err(DeliveryError::new(
                self.transport(),
                "no adapter registered",
            ));
        };
        adapter.send_command(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingAdapter {
        transport: Transport,
        telemetry: AtomicU32,
        commands: AtomicU32,
        fail_telemetry: bool,
    }

    impl CountingAdapter {
        fn new(transport: Transport) -> Arc<Self> {
            Arc::new(Self {
                transport,
                telemetry: AtomicU32::new(0),
                commands: AtomicU32::new(0),
                fail_telemetry: false,
            })
        }

        fn failing(transport: Transport) -> Arc<Self> {
            Arc::new(Self {
                transport,
                telemetry: AtomicU32::new(0),
                commands: AtomicU32::new(0),
                fail_telemetry: true,
            })
        }
    }

    #[async_trait]
    impl BridgeAdapter for CountingAdapter {
        fn transport(&self) -> Transport {
            self.transport
        }

        async fn init(&self) -> Result<(), AdapterInitError> {
            Ok(())
        }

        async fn publish_telemetry(&self, _telemetry: Telemetry) -> Result<(), DeliveryError> {
            self.telemetry.fetch_add(1, Ordering::SeqCst);
            if self.fail_telemetry {
                return Err(DeliveryError::new(self.transport, "down"));
            }
            Ok(())
        }

        async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
            self.commands.fetch_add(1, Ordering::SeqCst);
            Ok(Ack::success(command.device_id, command.command_id))
        }
    }

    fn telemetry() -> Telemetry {
        Telemetry::new("dev-1").with_metric("temp_c", 20.0)
    }

    #[tokio::test]
    async fn test_fan_out_isolates_failures() {
        let registry = AdapterRegistry::new();
        let bad = CountingAdapter::failing(Transport::Mqtt);
        let good = CountingAdapter::new(Transport::WebSocket);
        registry.register(bad.clone());
        registry.register(good.clone());

        registry.publish_telemetry(telemetry()).await.unwrap();

        assert_eq!(bad.telemetry.load(Ordering::SeqCst), 1);
        assert_eq!(good.telemetry.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_command_follows_route() {
        let registry = AdapterRegistry::new();
        let mqtt = CountingAdapter::new(Transport::Mqtt);
        let ws = CountingAdapter::new(Transport::WebSocket);
        registry.register(mqtt.clone());
        registry.register(ws.clone());
        registry.set_route("dev-1", Transport::WebSocket);

        registry
            .send_command(Command::new("dev-1", "relay_control"))
            .await
            .unwrap();

        assert_eq!(ws.commands.load(Ordering::SeqCst), 1);
        assert_eq!(mqtt.commands.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_command_falls_back_to_first_adapter() {
        let registry = AdapterRegistry::new();
        let mqtt = CountingAdapter::new(Transport::Mqtt);
        registry.register(mqtt.clone());

        registry
            .send_command(Command::new("dev-unrouted", "relay_control"))
            .await
            .unwrap();
        assert_eq!(mqtt.commands.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_registry_rejects_commands() {
        let registry = AdapterRegistry::new();
        let err = registry
            .send_command(Command::new("dev-1", "relay_control"))
            .await
            .unwrap_err();
        assert!(err.message.contains("no adapter"));
    }
}
