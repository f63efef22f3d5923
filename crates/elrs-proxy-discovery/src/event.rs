//! Discovery events delivered to the registry

use crate::error::{DiscoveryError, DiscoveryResult};
use elrs_proxy_core::DeviceDescriptor;
use std::collections::HashMap;
use std::net::IpAddr;

/// A resolved service announcement as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAnnouncement {
    /// Full DNS-SD instance name
    pub name: String,
    /// Resolved addresses; the first one is authoritative
    pub addresses: Vec<IpAddr>,
    /// Service port
    pub port: u16,
    /// Raw TXT records; a key without `=` carries no value
    pub properties: Vec<(String, Option<Vec<u8>>)>,
}

impl ServiceAnnouncement {
    /// Decode into a device descriptor
    ///
    /// Fails when no address was resolved or a TXT value is not UTF-8.
    pub fn decode(&self) -> DiscoveryResult<DeviceDescriptor> {
        let address = *self
            .addresses
            .first()
            .ok_or_else(|| DiscoveryError::decode(&self.name, "no resolved address"))?;

        let mut properties = HashMap::with_capacity(self.properties.len());
        for (key, value) in &self.properties {
            let value = match value {
                Some(bytes) => String::from_utf8(bytes.clone()).map_err(|_| {
                    DiscoveryError::decode(&self.name, format!("property '{}' is not UTF-8", key))
                })?,
                None => String::new(),
            };
            properties.insert(key.clone(), value);
        }

        Ok(DeviceDescriptor::new(
            self.name.clone(),
            address,
            self.port,
            properties,
        ))
    }
}

/// The closed set of notifications the registry consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// First resolution of a service instance
    Added(ServiceAnnouncement),
    /// Re-resolution of a known service instance
    Updated(ServiceAnnouncement),
    /// The instance said goodbye or its records expired
    Removed { name: String },
}

impl DiscoveryEvent {
    /// Instance name the event refers to
    pub fn name(&self) -> &str {
        match self {
            DiscoveryEvent::Added(a) | DiscoveryEvent::Updated(a) => &a.name,
            DiscoveryEvent::Removed { name } => name,
        }
    }
}
