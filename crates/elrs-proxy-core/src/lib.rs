//! ELRS Proxy Core - Shared types and configuration
//!
//! This crate provides the foundational types used by the discovery registry
//! and the forwarding server.

pub mod config;
pub mod device;
pub mod error;

pub use config::{Config, ForwardPolicy};
pub use device::DeviceDescriptor;
pub use error::{Error, Result};
