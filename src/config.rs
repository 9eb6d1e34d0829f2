//! Configuration types for caddy-dns.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// DNS server configuration.
    pub dns: DnsConfig,

    /// Caddy admin API configuration.
    #[serde(default)]
    pub caddy: CaddyConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for DNS server to listen on (UDP and TCP).
    pub listen_addr: SocketAddr,

    /// TTL for synthesized address records in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Idle timeout for TCP connections in seconds.
    #[serde(default = "default_tcp_timeout_secs")]
    pub tcp_timeout_secs: u64,
}

impl DnsConfig {
    /// Idle timeout for TCP connections.
    pub fn tcp_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp_timeout_secs)
    }
}

/// Caddy admin API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaddyConfig {
    /// Full URL of the admin config endpoint.
    #[serde(default = "default_admin_url")]
    pub admin_url: String,

    /// Seconds between binding refreshes.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Upper bound in seconds for a single admin API request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl CaddyConfig {
    /// Period of the background refresh task.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Timeout applied to each admin API request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for CaddyConfig {
    fn default() -> Self {
        Self {
            admin_url: default_admin_url(),
            refresh_interval_secs: default_refresh_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "caddy_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "caddy-dns".to_string()
}

fn default_ttl() -> u32 {
    300
}

fn default_tcp_timeout_secs() -> u64 {
    30
}

fn default_admin_url() -> String {
    "http://caddy:2019/config/".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "dns": { "listen_addr": "127.0.0.1:5353" }
        }))
        .unwrap();

        assert_eq!(config.dns.ttl, 300);
        assert_eq!(config.dns.tcp_timeout(), Duration::from_secs(30));
        assert_eq!(config.caddy.admin_url, "http://caddy:2019/config/");
        assert_eq!(config.caddy.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.caddy.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_caddy_overrides() {
        let caddy: CaddyConfig = serde_json::from_value(serde_json::json!({
            "admin_url": "http://127.0.0.1:2019/config/",
            "refresh_interval_secs": 5
        }))
        .unwrap();

        assert_eq!(caddy.admin_url, "http://127.0.0.1:2019/config/");
        assert_eq!(caddy.refresh_interval(), Duration::from_secs(5));
        assert_eq!(caddy.request_timeout_secs, 10);
    }
}
