//! ELRS Proxy Server - Axum-based registry endpoint and forwarding proxy
//!
//! Serves discovered devices at `GET /mdns` and forwards every other request
//! to the host named in its path, adding permissive CORS headers.

pub mod error;
pub mod http;
pub mod proxy;
pub mod state;
pub mod upstream;

#[cfg(test)]
mod testing;

pub use error::GatewayError;
pub use http::create_router;
pub use state::AppState;
pub use upstream::{ReqwestUpstream, Upstream, UpstreamBody, UpstreamRequest, UpstreamResponse};
