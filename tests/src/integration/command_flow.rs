//! # Command Delivery Tests
//!
//! Dispatch round trips across the dispatcher, the idempotency store, a
//! transport adapter, and the bus:
//!
//! ```text
//! consumer ──dispatch──> [idempotency + retry + timeout] ──> adapter ──> device
//!                                                                │
//!      ack subscribers <── [Message Bus] <───── Ack ─────────────┘
//! ```

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bridge_bus::{BusPublisher, MessageBus, MessageFilter};
    use bridge_dispatch::{CommandDispatcher, CommandLog, DispatcherConfig, RetryPolicy};
    use bridge_security::IdempotencyStore;
    use bridge_types::{
        Ack, AdapterInitError, BridgeAdapter, BridgeError, BridgeMessage, Command, CommandState,
        DeliveryError, MessageKind, Telemetry, Transport,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Device double reachable over a fake transport.
    struct FakeDevice {
        deliveries: AtomicU32,
        transport_failures: AtomicU32,
        reject_commands: bool,
    }

    impl FakeDevice {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                deliveries: AtomicU32::new(0),
                transport_failures: AtomicU32::new(0),
                reject_commands: false,
            })
        }

        fn flaky(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                deliveries: AtomicU32::new(0),
                transport_failures: AtomicU32::new(failures),
                reject_commands: false,
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                deliveries: AtomicU32::new(0),
                transport_failures: AtomicU32::new(0),
                reject_commands: true,
            })
        }
    }

    #[async_trait]
    impl BridgeAdapter for FakeDevice {
        fn transport(&self) -> Transport {
            Transport::Mqtt
        }

        async fn init(&self) -> Result<(), AdapterInitError> {
            Ok(())
        }

        async fn publish_telemetry(&self, _telemetry: Telemetry) -> Result<(), DeliveryError> {
            Ok(())
        }

        async fn send_command(&self, command: Command) -> Result<Ack, DeliveryError> {
            let failures = self.transport_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.transport_failures.store(failures - 1, Ordering::SeqCst);
                return Err(DeliveryError::new(Transport::Mqtt, "radio silence"));
            }
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            if self.reject_commands {
                Ok(Ack::rejected(
                    command.device_id,
                    command.command_id,
                    "unsupported",
                    "command not in capability set",
                ))
            } else {
                Ok(Ack::success(command.device_id, command.command_id))
            }
        }
    }

    fn dispatcher(device: Arc<FakeDevice>, bus: Arc<MessageBus>) -> CommandDispatcher {
        CommandDispatcher::new(
            device,
            Arc::new(IdempotencyStore::new()),
            Arc::new(CommandLog::new()),
            bus,
            DispatcherConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_ack_reaches_bus_subscribers() {
        let bus = Arc::new(MessageBus::new());
        let mut acks = bus.subscribe(MessageFilter::kinds(vec![MessageKind::Ack]));
        let device = FakeDevice::new();
        let dispatcher = dispatcher(device, bus);

        let cmd = Command::new("dev-1", "relay_control");
        let command_id = cmd.command_id;
        dispatcher.dispatch(cmd).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(200), acks.recv())
            .await
            .unwrap()
            .unwrap();
        let BridgeMessage::Ack(ack) = received else {
            panic!("expected ack");
        };
        assert_eq!(ack.command_id, command_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retry_until_success() {
        let bus = Arc::new(MessageBus::new());
        let device = FakeDevice::flaky(2);
        let mut config = DispatcherConfig::default();
        config.default_timeout = Duration::from_secs(120);
        let dispatcher = CommandDispatcher::new(
            device.clone(),
            Arc::new(IdempotencyStore::new()),
            Arc::new(CommandLog::new()),
            bus,
            config,
        );

        let ack = dispatcher
            .dispatch(Command::new("dev-1", "relay_control"))
            .await
            .unwrap();
        assert!(ack.ok);
        assert_eq!(device.deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_retry_exhausted() {
        let bus = Arc::new(MessageBus::new());
        let device = FakeDevice::flaky(100);
        let mut config = DispatcherConfig::default();
        config.retry = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        config.default_timeout = Duration::from_secs(600);
        let dispatcher = CommandDispatcher::new(
            device,
            Arc::new(IdempotencyStore::new()),
            Arc::new(CommandLog::new()),
            bus,
            config,
        );

        let cmd = Command::new("dev-1", "relay_control");
        let command_id = cmd.command_id;
        let err = dispatcher.dispatch(cmd).await.unwrap_err();
        assert!(matches!(err, BridgeError::RetryExhausted { .. }));
        assert_eq!(
            dispatcher.log().state(command_id),
            Some(CommandState::Failed)
        );
    }

    #[tokio::test]
    async fn test_concurrent_idempotent_commands_deliver_once() {
        let bus = Arc::new(MessageBus::new());
        let device = FakeDevice::new();
        let dispatcher = Arc::new(dispatcher(device.clone(), bus));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let dispatcher = Arc::clone(&dispatcher);
            let cmd = Command::new("dev-1", "set_pwm").with_idempotency_key("cmd-42");
            handles.push(tokio::spawn(async move { dispatcher.dispatch(cmd).await }));
        }

        let mut acks = Vec::new();
        for handle in handles {
            acks.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(device.deliveries.load(Ordering::SeqCst), 1);
        assert!(acks.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_device_rejection_is_an_ack_not_an_error() {
        let bus = Arc::new(MessageBus::new());
        let device = FakeDevice::rejecting();
        let dispatcher = dispatcher(device, bus);

        let cmd = Command::new("dev-1", "warp_drive");
        let command_id = cmd.command_id;
        let ack = dispatcher.dispatch(cmd).await.unwrap();

        assert!(!ack.ok);
        assert_eq!(ack.code.as_deref(), Some("unsupported"));
        // A negative device result marks the command failed, not delivered.
        assert_eq!(
            dispatcher.log().state(command_id),
            Some(CommandState::Failed)
        );
    }
}
