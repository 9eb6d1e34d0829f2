//! DNS server setup and lifecycle management.

use hickory_server::authority::Catalog;
use hickory_server::ServerFuture;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::chain::Plugin;
use crate::config::Config;
use crate::error::DnsError;

/// DNS server with the Caddy interceptor in front of a downstream catalog.
pub struct DnsServer {
    config: Config,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the DNS server until `shutdown` is cancelled.
    ///
    /// The admin API is queried once before any socket is bound; failure
    /// there aborts startup.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.dns.listen_addr,
            admin_url = %self.config.caddy.admin_url,
            refresh_interval_secs = self.config.caddy.refresh_interval_secs,
            "Starting caddy-dns server"
        );

        let plugin = Plugin::setup(&self.config.caddy, self.config.dns.ttl, &shutdown).await?;

        // Downstream of the interceptor: an empty catalog, which refuses
        // names it is not authoritative for.
        let handler = plugin.register(Catalog::new());
        let mut server = ServerFuture::new(handler);

        let udp_socket = UdpSocket::bind(self.config.dns.listen_addr).await?;
        info!(addr = %self.config.dns.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        let tcp_listener = TcpListener::bind(self.config.dns.listen_addr).await?;
        info!(addr = %self.config.dns.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, self.config.dns.tcp_timeout());

        info!(
            bindings = plugin.store().len(),
            "DNS server ready to serve queries"
        );

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
            }
        }

        info!("Waiting for refresh task to stop...");
        plugin.shutdown().await;

        info!("DNS server stopped");
        Ok(())
    }
}
