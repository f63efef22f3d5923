//! Configuration types for the ELRS proxy

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 9097;

/// Default DNS-SD service type browsed for devices
pub const DEFAULT_SERVICE_TYPE: &str = "_http._tcp.local.";

/// Default value required under the `vendor` TXT key
pub const DEFAULT_VENDOR_FILTER: &str = "elrs";

/// Default timeout for a single forwarded request
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Default status of an OPTIONS preflight answer
pub const DEFAULT_PREFLIGHT_STATUS: u16 = 200;

/// Which hosts the forwarding path may contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ForwardPolicy {
    /// Forward to any host named in the request path
    Any,
    /// Forward only to discovered devices and explicitly listed hosts
    Restricted { allowed: Vec<String> },
}

impl Default for ForwardPolicy {
    fn default() -> Self {
        ForwardPolicy::Restricted {
            allowed: Vec::new(),
        }
    }
}

impl ForwardPolicy {
    /// Restricted policy with an explicit allow-list
    pub fn restricted<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ForwardPolicy::Restricted {
            allowed: allowed
                .into_iter()
                .map(|host| normalize_host(&host.into()))
                .collect(),
        }
    }

    /// Whether every host is allowed
    pub fn is_open(&self) -> bool {
        matches!(self, ForwardPolicy::Any)
    }

    /// Whether `host` is allowed without consulting the device registry
    pub fn allows(&self, host: &str) -> bool {
        match self {
            ForwardPolicy::Any => true,
            ForwardPolicy::Restricted { allowed } => {
                let host = normalize_host(host);
                allowed.iter().any(|entry| normalize_host(entry) == host)
            }
        }
    }
}

impl std::fmt::Display for ForwardPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardPolicy::Any => write!(f, "any host"),
            ForwardPolicy::Restricted { allowed } if allowed.is_empty() => {
                write!(f, "discovered devices only")
            }
            ForwardPolicy::Restricted { allowed } => {
                write!(f, "discovered devices and {}", allowed.join(", "))
            }
        }
    }
}

/// Lowercase a host and strip IPv6 brackets and a trailing root dot
pub fn normalize_host(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Main configuration for the ELRS proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,
    /// DNS-SD service type to browse
    pub service_type: String,
    /// Value required under the `vendor` TXT key
    pub vendor_filter: String,
    /// Timeout for each forwarded request, in seconds
    pub upstream_timeout_secs: u64,
    /// Status code returned for OPTIONS preflight requests
    pub preflight_status: u16,
    /// Which hosts may be forwarded to
    pub forward_policy: ForwardPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            vendor_filter: DEFAULT_VENDOR_FILTER.to_string(),
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            preflight_status: DEFAULT_PREFLIGHT_STATUS,
            forward_policy: ForwardPolicy::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set service type
    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = service_type.into();
        self
    }

    /// Builder pattern: set vendor filter
    pub fn with_vendor_filter(mut self, vendor: impl Into<String>) -> Self {
        self.vendor_filter = vendor.into();
        self
    }

    /// Builder pattern: set upstream timeout in seconds
    pub fn with_upstream_timeout_secs(mut self, secs: u64) -> Self {
        self.upstream_timeout_secs = secs;
        self
    }

    /// Builder pattern: set preflight status
    pub fn with_preflight_status(mut self, status: u16) -> Self {
        self.preflight_status = status;
        self
    }

    /// Builder pattern: set forwarding policy
    pub fn with_forward_policy(mut self, policy: ForwardPolicy) -> Self {
        self.forward_policy = policy;
        self
    }

    /// Timeout applied to each forwarded request
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Check values that clap cannot check on its own
    pub fn validate(&self) -> crate::Result<()> {
        if !self.service_type.ends_with(".local.") {
            return Err(crate::Error::config(format!(
                "Invalid service type: {}. Expected e.g. _http._tcp.local.",
                self.service_type
            )));
        }
        if self.vendor_filter.is_empty() {
            return Err(crate::Error::config("Vendor filter must not be empty"));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(crate::Error::config("Upstream timeout must be at least 1 second"));
        }
        if !(200..600).contains(&self.preflight_status) {
            return Err(crate::Error::config(format!(
                "Invalid preflight status: {}",
                self.preflight_status
            )));
        }
        Ok(())
    }
}
