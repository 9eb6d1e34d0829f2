//! Error types for caddy-dns.

use std::net::AddrParseError;

use thiserror::Error;

/// Errors that can occur in the interceptor.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The admin endpoint could not be reached, timed out, or answered with a
    /// non-success status.
    #[error("admin endpoint transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The admin endpoint body was not a JSON document of the expected shape.
    #[error("admin config decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A stored binding does not hold a valid IP address.
    #[error("invalid address {address:?} bound to {name}: {source}")]
    AddressParse {
        /// Hostname the binding belongs to.
        name: String,
        /// Address text as stored in the binding table.
        address: String,
        /// Underlying parse failure.
        #[source]
        source: AddrParseError,
    },

    /// Plugin setup failed; the handler must not be registered.
    #[error("{plugin}: {source}")]
    Setup {
        /// Name of the plugin that failed to set up.
        plugin: &'static str,
        /// Cause of the failure.
        #[source]
        source: Box<DnsError>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DnsError {
    /// Wrap an error as a setup failure of the named plugin.
    pub fn setup(plugin: &'static str, source: DnsError) -> Self {
        DnsError::Setup {
            plugin,
            source: Box::new(source),
        }
    }
}
