//! mDNS/DNS-SD browsing for devices on the local network
//!
//! Browses a service type with `mdns-sd` and turns resolved/removed
//! notifications into [`DiscoveryEvent`]s for the registry.

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::event::{DiscoveryEvent, ServiceAnnouncement};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashSet;
use std::net::IpAddr;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Active mDNS browse feeding the device registry
///
/// The browse is released on [`MdnsBrowser::stop`] or, failing that, on drop.
pub struct MdnsBrowser {
    daemon: ServiceDaemon,
    service_type: String,
    active: bool,
}

impl MdnsBrowser {
    /// Start browsing `service_type`, sending events into `events`
    ///
    /// # Arguments
    /// * `service_type` - DNS-SD type, e.g. `_http._tcp.local.`
    /// * `events` - Channel drained by the registry owner task
    pub fn start(
        service_type: &str,
        events: mpsc::Sender<DiscoveryEvent>,
    ) -> DiscoveryResult<Self> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        let receiver = daemon
            .browse(service_type)
            .map_err(|e| DiscoveryError::Mdns(e.to_string()))?;

        // The daemon hands out a blocking receiver; pump it on its own thread
        std::thread::Builder::new()
            .name("mdns-browse".to_string())
            .spawn(move || {
                let mut tracker = EventTracker::default();
                while let Ok(event) = receiver.recv() {
                    let Some(event) = tracker.translate(event) else {
                        continue;
                    };
                    if events.blocking_send(event).is_err() {
                        debug!("mDNS: Registry channel closed, stopping browse thread");
                        break;
                    }
                }
                debug!("mDNS: Browse thread exiting");
            })?;

        info!("mDNS: Browsing for '{}'", service_type);

        Ok(Self {
            daemon,
            service_type: service_type.to_string(),
            active: true,
        })
    }

    /// Stop browsing and shut the daemon down
    pub fn stop(&mut self) -> DiscoveryResult<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        let stop_result = self.daemon.stop_browse(&self.service_type);
        let shutdown_result = self.daemon.shutdown();

        stop_result.map_err(|e| DiscoveryError::Shutdown(e.to_string()))?;
        shutdown_result.map_err(|e| DiscoveryError::Shutdown(e.to_string()))?;

        info!("mDNS: Stopped browsing '{}'", self.service_type);
        Ok(())
    }

    /// Get the browsed service type
    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for MdnsBrowser {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("mDNS: {}", e);
        }
    }
}

/// Classifies resolutions as first sightings or updates
///
/// `mdns-sd` reports every resolution the same way, so the browse thread
/// remembers which names it has already announced.
#[derive(Debug, Default)]
struct EventTracker {
    seen: HashSet<String>,
}

impl EventTracker {
    fn translate(&mut self, event: ServiceEvent) -> Option<DiscoveryEvent> {
        match event {
            ServiceEvent::ServiceResolved(info) => {
                let announcement = announcement_from_info(&info);
                if self.seen.insert(announcement.name.clone()) {
                    Some(DiscoveryEvent::Added(announcement))
                } else {
                    Some(DiscoveryEvent::Updated(announcement))
                }
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                self.seen.remove(&fullname);
                Some(DiscoveryEvent::Removed { name: fullname })
            }
            ServiceEvent::SearchStarted(ty) => {
                debug!("mDNS: Search started for {}", ty);
                None
            }
            _ => None,
        }
    }
}

/// Convert resolved service info, preferring IPv4 addresses
fn announcement_from_info(info: &ServiceInfo) -> ServiceAnnouncement {
    let mut addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
    addresses.sort_by_key(|addr| (addr.is_ipv6(), *addr));

    let properties = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val().map(<[u8]>::to_vec)))
        .collect();

    ServiceAnnouncement {
        name: info.get_fullname().to_string(),
        addresses,
        port: info.get_port(),
        properties,
    }
}
