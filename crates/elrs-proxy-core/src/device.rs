//! Discovered device descriptor

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// A device currently advertising the configured vendor tag
///
/// Serialized as `{"name", "address", "port", "properties"}` for the
/// `/mdns` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Full DNS-SD instance name, unique within the registry
    pub name: String,
    /// Resolved address of the device
    pub address: IpAddr,
    /// Port the device's service listens on
    pub port: u16,
    /// Decoded TXT record properties
    pub properties: HashMap<String, String>,
}

impl DeviceDescriptor {
    /// Create a new descriptor
    pub fn new(
        name: impl Into<String>,
        address: IpAddr,
        port: u16,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            port,
            properties,
        }
    }

    /// Look up a TXT property by key
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether the `vendor` property equals `vendor`
    pub fn has_vendor(&self, vendor: &str) -> bool {
        self.property("vendor") == Some(vendor)
    }
}
