//! ELRS Proxy Discovery
//!
//! Tracks ExpressLRS devices on the local network:
//!
//! - **mDNS/DNS-SD**: [`MdnsBrowser`] browses a service type (by default
//!   `_http._tcp.local.`) and emits [`DiscoveryEvent`]s.
//!
//! - **Registry**: [`DiscoveryRegistry`] applies those events, keeping only
//!   devices whose `vendor` TXT property matches, and serves consistent
//!   [`RegistrySnapshot`]s to readers.

mod error;
mod event;
mod mdns;
mod registry;

pub use error::{DiscoveryError, DiscoveryResult};
pub use event::{DiscoveryEvent, ServiceAnnouncement};
pub use mdns::MdnsBrowser;
pub use registry::{DiscoveryRegistry, RegistryChange, RegistrySnapshot};
