//! Discovery error types

use thiserror::Error;

/// Errors that can occur during device discovery
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS error: {0}")]
    Mdns(String),

    #[error("Malformed announcement for '{name}': {reason}")]
    Decode { name: String, reason: String },

    #[error("Failed to release mDNS browser: {0}")]
    Shutdown(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoveryError {
    /// Create a decode error for the announcement `name`
    pub fn decode(name: impl Into<String>, reason: impl Into<String>) -> Self {
        DiscoveryError::Decode {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
