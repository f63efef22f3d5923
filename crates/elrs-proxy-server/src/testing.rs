//! Test doubles shared by the handler tests

use crate::error::GatewayError;
use crate::state::AppState;
use crate::upstream::{Upstream, UpstreamRequest, UpstreamResponse};
use axum::http::{HeaderValue, StatusCode};
use bytes::Bytes;
use elrs_proxy_core::{Config, ForwardPolicy};
use elrs_proxy_discovery::{DiscoveryEvent, DiscoveryRegistry, ServiceAnnouncement};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// Upstream that records every request and answers with a canned reply
pub(crate) struct RecordingUpstream {
    calls: Mutex<Vec<UpstreamRequest>>,
    reply: Option<(StatusCode, &'static str)>,
}

impl RecordingUpstream {
    pub(crate) fn replying(status: StatusCode, body: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: Some((status, body)),
        })
    }

    /// Every call fails as if the host refused the connection
    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: None,
        })
    }

    pub(crate) fn calls(&self) -> Vec<UpstreamRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Upstream for RecordingUpstream {
    fn send(&self, request: UpstreamRequest) -> BoxFuture<'_, Result<UpstreamResponse, GatewayError>> {
        self.calls.lock().unwrap().push(request);
        let result = match self.reply {
            Some((status, body)) => Ok(UpstreamResponse {
                status,
                content_type: Some(HeaderValue::from_static("text/plain")),
                location: None,
                body: Bytes::from_static(body.as_bytes()),
            }),
            None => Err(GatewayError::Upstream("connection refused".to_string())),
        };
        Box::pin(async move { result })
    }
}

pub(crate) fn app_state(upstream: Arc<dyn Upstream>, policy: ForwardPolicy) -> Arc<AppState> {
    let config = Config::new().with_forward_policy(policy);
    let registry = Arc::new(DiscoveryRegistry::new(config.vendor_filter.clone()));
    Arc::new(AppState::new(config, registry, upstream))
}

pub(crate) fn register_device(registry: &DiscoveryRegistry, name: &str, address: &str, port: u16) {
    registry
        .apply(DiscoveryEvent::Added(ServiceAnnouncement {
            name: name.to_string(),
            addresses: vec![address.parse().unwrap()],
            port,
            properties: vec![("vendor".to_string(), Some(b"elrs".to_vec()))],
        }))
        .unwrap();
}
