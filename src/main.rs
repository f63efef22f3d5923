//! ELRS Proxy - reach ExpressLRS devices from a browser on another origin
//!
//! Browses the local network for devices advertising `vendor=elrs`, lists
//! them at `GET /mdns`, and forwards every other request to the host named
//! in its path with permissive CORS headers added.

use anyhow::Result;
use clap::Parser;
use elrs_proxy_core::{config, Config, ForwardPolicy};
use elrs_proxy_discovery::{DiscoveryRegistry, MdnsBrowser};
use elrs_proxy_server::{create_router, AppState, ReqwestUpstream};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Capacity of the discovery event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// ELRS Proxy - mDNS device list and CORS forwarding for ExpressLRS devices
#[derive(Parser, Debug)]
#[command(name = "elrs-proxy")]
#[command(version, about, long_about = None)]
struct Args {
    /// HTTP listen port
    #[arg(short, long, env = "ELRS_PROXY_PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// DNS-SD service type to browse
    #[arg(long, default_value = config::DEFAULT_SERVICE_TYPE)]
    service_type: String,

    /// Required value of the `vendor` TXT property
    #[arg(long = "vendor", default_value = config::DEFAULT_VENDOR_FILTER)]
    vendor_filter: String,

    /// Timeout for each forwarded request, in seconds
    #[arg(short, long, default_value_t = config::DEFAULT_UPSTREAM_TIMEOUT_SECS)]
    timeout: u64,

    /// Status code for OPTIONS preflight responses
    #[arg(long, default_value_t = config::DEFAULT_PREFLIGHT_STATUS)]
    preflight_status: u16,

    /// Forward to any host named in the request path (open proxy)
    #[arg(long, conflicts_with = "allow_host")]
    allow_any_host: bool,

    /// Additional host that may be forwarded to besides discovered devices
    /// (repeatable)
    #[arg(long = "allow-host", value_name = "HOST")]
    allow_host: Vec<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn forward_policy(&self) -> ForwardPolicy {
        if self.allow_any_host {
            ForwardPolicy::Any
        } else {
            ForwardPolicy::restricted(self.allow_host.iter().cloned())
        }
    }

    fn to_config(&self) -> Config {
        Config::new()
            .with_port(self.port)
            .with_service_type(self.service_type.clone())
            .with_vendor_filter(self.vendor_filter.clone())
            .with_upstream_timeout_secs(self.timeout)
            .with_preflight_status(self.preflight_status)
            .with_forward_policy(self.forward_policy())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("ELRS Proxy v{}", env!("CARGO_PKG_VERSION"));

    let config = args.to_config();
    config.validate()?;

    if config.forward_policy.is_open() {
        warn!("Forwarding: ANY HOST (--allow-any-host set, this is an open proxy)");
    } else {
        info!("Forwarding: {}", config.forward_policy);
    }

    // Registry and its single writer task
    let registry = Arc::new(DiscoveryRegistry::new(config.vendor_filter.clone()));
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let registry_owner = registry.clone();
    let registry_handle = tokio::spawn(async move { registry_owner.run(event_rx).await });

    // Without mDNS the proxy still forwards; the device list just stays empty
    let mut browser = match MdnsBrowser::start(&config.service_type, event_tx) {
        Ok(browser) => Some(browser),
        Err(e) => {
            warn!("mDNS: Failed to start browsing: {}", e);
            None
        }
    };

    let upstream = Arc::new(ReqwestUpstream::new(config.upstream_timeout())?);
    let state = Arc::new(AppState::new(config.clone(), registry, upstream));
    let router = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting ELRS proxy on {}", addr);
    info!("Press Ctrl+C to stop.");

    let served = serve(addr, router).await;

    // Release the browse whether or not the server exited cleanly
    if let Some(browser) = browser.as_mut() {
        if let Err(e) = browser.stop() {
            warn!("mDNS: {}", e);
        }
    }
    registry_handle.abort();

    if let Err(ref e) = served {
        warn!("Server stopped with error: {}", e);
    }
    info!("Goodbye!");
    served
}

async fn serve(addr: std::net::SocketAddr, router: axum::Router) -> Result<()> {
    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
