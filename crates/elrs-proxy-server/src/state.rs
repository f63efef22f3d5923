//! Shared application state

use crate::upstream::Upstream;
use elrs_proxy_core::Config;
use elrs_proxy_discovery::DiscoveryRegistry;
use std::sync::Arc;

/// State shared by all request handlers
///
/// Handlers only read the registry; the discovery task is its sole writer.
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Devices discovered on the local network
    pub registry: Arc<DiscoveryRegistry>,
    /// Client used for forwarded requests
    pub upstream: Arc<dyn Upstream>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, registry: Arc<DiscoveryRegistry>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config,
            registry,
            upstream,
        }
    }

    /// Whether the forwarding policy permits contacting `host`
    ///
    /// Hosts that are not explicitly allowed must be the address of a
    /// currently registered device.
    pub fn may_forward_to(&self, host: &str) -> bool {
        self.config.forward_policy.allows(host) || self.registry.snapshot().contains_address(host)
    }
}
