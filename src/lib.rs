//! Caddy DNS - A DNS interceptor for hosts reverse-proxied by Caddy.
//!
//! This crate answers A/AAAA queries for hostnames that Caddy reverse-proxies,
//! using the upstream address from Caddy's live config. The config is pulled
//! from the Caddy admin API at startup and every refresh interval after that.
//! Everything else goes to the next handler in the chain.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          caddy-dns                              │
//! │                                                                 │
//! │  ┌──────────────────┐    ┌──────────────────┐                  │
//! │  │ RefreshFetcher   │───▶│  BindingTable    │                  │
//! │  │ (every 30s)      │    │  (RwLock, swap)  │                  │
//! │  └──────────────────┘    └────────┬─────────┘                  │
//! │         │                         │                             │
//! │         │ GET /config/            ▼                             │
//! │         │                    ┌──────────────────┐              │
//! │         │                    │ ProxyInterceptor │◀── UDP/TCP   │
//! │         ▼                    │   hit: answer    │    :53       │
//! │    Caddy admin API           │   miss: next ────┼──▶ next      │
//! │                              └──────────────────┘              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use caddy_dns::{chain::Plugin, CaddyConfig};
//! use hickory_server::authority::Catalog;
//! use hickory_server::ServerFuture;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let shutdown = CancellationToken::new();
//!     let plugin = Plugin::setup(&CaddyConfig::default(), 300, &shutdown)
//!         .await
//!         .unwrap();
//!
//!     let mut server = ServerFuture::new(plugin.register(Catalog::new()));
//!     // register sockets, then server.block_until_done().await
//! }
//! ```

#![warn(missing_docs)]

pub mod caddy;
pub mod chain;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod refresh;
pub mod server;
pub mod state;
pub mod telemetry;

// Re-export main types
pub use chain::{Plugin, PLUGIN_NAME};
pub use config::{CaddyConfig, Config, DnsConfig, TelemetryConfig};
pub use error::DnsError;
pub use handler::ProxyInterceptor;
pub use refresh::{RefreshFetcher, RefreshOutcome, RefreshTask};
pub use server::DnsServer;
pub use state::BindingTable;
