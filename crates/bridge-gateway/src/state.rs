//! Shared gateway state.

use crate::config::GatewayConfig;
use bridge_adapters::LoraWanAdapter;
use bridge_bus::MessageBus;
use bridge_dispatch::{CommandDispatcher, CommandLog};
use bridge_provisioning::ProvisioningService;
use bridge_security::{Authenticator, RateLimiter};
use std::sync::Arc;

/// Everything the route handlers share.
pub struct AppState {
    pub config: GatewayConfig,
    pub provisioning: Arc<ProvisioningService>,
    pub authenticator: Arc<Authenticator>,
    pub tenant_limiter: Arc<RateLimiter>,
    pub device_limiter: Arc<RateLimiter>,
    pub bus: Arc<MessageBus>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub command_log: Arc<CommandLog>,
    pub lorawan: Arc<LoraWanAdapter>,
}
