//! Gateway binary: wires the in-memory bridge core behind the HTTP surface.

use anyhow::Context;
use bridge_adapters::{AdapterRegistry, LoraWanAdapter, LoraWanConfig};
use bridge_bus::MessageBus;
use bridge_dispatch::{CommandDispatcher, CommandLog, DispatcherConfig};
use bridge_gateway::{router, AppState, GatewayConfig};
use bridge_provisioning::{InMemoryDeviceStore, InMemoryTokenStore, ProvisioningService};
use bridge_security::{Authenticator, IdempotencyStore, RateLimiter};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = GatewayConfig::from_env();

    let devices = Arc::new(InMemoryDeviceStore::new());
    let tokens = Arc::new(InMemoryTokenStore::new());
    let bus = Arc::new(MessageBus::new());
    let command_log = Arc::new(CommandLog::new());

    let lorawan = Arc::new(LoraWanAdapter::new(LoraWanConfig::default(), bus.clone()));
    let registry = Arc::new(AdapterRegistry::new());
    registry.register(lorawan.clone());
    registry
        .init_all()
        .await
        .context("adapter initialization failed")?;

    let dispatcher = Arc::new(CommandDispatcher::new(
        registry,
        Arc::new(IdempotencyStore::new()),
        command_log.clone(),
        bus.clone(),
        DispatcherConfig::default(),
    ));

    let state = Arc::new(AppState {
        config: config.clone(),
        provisioning: Arc::new(ProvisioningService::new(tokens, devices.clone())),
        authenticator: Arc::new(Authenticator::new(devices)),
        tenant_limiter: Arc::new(RateLimiter::tenant_policy()),
        device_limiter: Arc::new(RateLimiter::device_policy()),
        bus,
        dispatcher,
        command_log,
        lorawan,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "bridge gateway listening");

    axum::serve(listener, router(state))
        .await
        .context("server error")?;
    Ok(())
}
