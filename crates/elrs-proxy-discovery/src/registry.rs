//! Registry of discovered devices matching the vendor filter
//!
//! The registry is written by a single owner task draining a channel of
//! [`DiscoveryEvent`]s and read by HTTP handlers through [`RegistrySnapshot`].
//! Each event is applied under one write lock, so a snapshot never observes a
//! partially applied event.

use crate::error::DiscoveryResult;
use crate::event::DiscoveryEvent;
use elrs_proxy_core::config::normalize_host;
use elrs_proxy_core::DeviceDescriptor;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryChange {
    Inserted,
    Replaced,
    Removed,
    /// Filtered out, or a removal of an unknown name
    Unchanged,
}

/// Point-in-time copy of the registry, keyed by device name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegistrySnapshot(HashMap<String, DeviceDescriptor>);

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.0.values()
    }

    /// Whether any device resolved to `host` (an IP literal)
    pub fn contains_address(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.0
            .values()
            .any(|device| device.address.to_string() == host)
    }
}

/// Thread-safe registry of devices advertising the configured vendor
pub struct DiscoveryRegistry {
    vendor_filter: String,
    devices: RwLock<HashMap<String, DeviceDescriptor>>,
}

impl DiscoveryRegistry {
    /// Create an empty registry accepting devices whose `vendor` is `vendor_filter`
    pub fn new(vendor_filter: impl Into<String>) -> Self {
        Self {
            vendor_filter: vendor_filter.into(),
            devices: RwLock::new(HashMap::new()),
        }
    }

    pub fn vendor_filter(&self) -> &str {
        &self.vendor_filter
    }

    /// Apply a single event atomically
    ///
    /// An add or update that does not carry the vendor tag leaves any existing
    /// entry untouched; only a removal deletes it. Malformed announcements are
    /// rejected before the lock is taken.
    pub fn apply(&self, event: DiscoveryEvent) -> DiscoveryResult<RegistryChange> {
        match event {
            DiscoveryEvent::Added(announcement) | DiscoveryEvent::Updated(announcement) => {
                let device = announcement.decode()?;
                if !device.has_vendor(&self.vendor_filter) {
                    debug!(
                        "Ignoring '{}': vendor is not '{}'",
                        device.name, self.vendor_filter
                    );
                    return Ok(RegistryChange::Unchanged);
                }

                let name = device.name.clone();
                let address = device.address;
                let previous = match self.devices.write() {
                    Ok(mut guard) => guard.insert(name.clone(), device),
                    Err(poisoned) => poisoned.into_inner().insert(name.clone(), device),
                };

                if previous.is_some() {
                    info!("Device updated: {} ({})", name, address);
                    Ok(RegistryChange::Replaced)
                } else {
                    info!("Device added: {} ({})", name, address);
                    Ok(RegistryChange::Inserted)
                }
            }
            DiscoveryEvent::Removed { name } => {
                let removed = match self.devices.write() {
                    Ok(mut guard) => guard.remove(&name),
                    Err(poisoned) => poisoned.into_inner().remove(&name),
                };

                if removed.is_some() {
                    info!("Device removed: {}", name);
                    Ok(RegistryChange::Removed)
                } else {
                    Ok(RegistryChange::Unchanged)
                }
            }
        }
    }

    /// Consistent copy of the current device map
    pub fn snapshot(&self) -> RegistrySnapshot {
        let devices = match self.devices.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        RegistrySnapshot(devices)
    }

    /// Number of tracked devices
    pub fn len(&self) -> usize {
        match self.devices.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain `events` until every sender is dropped
    ///
    /// This task is the registry's only writer.
    pub async fn run(&self, mut events: mpsc::Receiver<DiscoveryEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.apply(event) {
                warn!("Dropping discovery event: {}", e);
            }
        }
        debug!("Discovery event channel closed");
    }
}
