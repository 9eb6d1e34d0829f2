//! Refreshing the binding table from the Caddy admin API.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::caddy::{self, StructureMismatch};
use crate::config::CaddyConfig;
use crate::error::DnsError;
use crate::metrics::{self, RefreshResult, Timer};
use crate::state::BindingTable;

/// What a refresh cycle did.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The table was replaced.
    Applied {
        /// Number of bindings installed.
        bindings: usize,
        /// Generation of the installed table.
        generation: u64,
        /// Sections of the document that were skipped.
        mismatches: Vec<StructureMismatch>,
    },
    /// Another cycle was in flight; nothing was done.
    Skipped,
}

/// Fetches the admin config and swaps the extracted bindings into the table.
pub struct RefreshFetcher {
    client: reqwest::Client,
    admin_url: String,
    store: BindingTable,
    in_flight: Mutex<()>,
}

impl RefreshFetcher {
    /// Create a fetcher for the configured admin endpoint.
    pub fn new(config: &CaddyConfig, store: BindingTable) -> Result<Self, DnsError> {
        if config.admin_url.is_empty() {
            return Err(DnsError::Config("caddy.admin_url must not be empty".into()));
        }
        if config.refresh_interval_secs == 0 {
            return Err(DnsError::Config(
                "caddy.refresh_interval_secs must be greater than zero".into(),
            ));
        }
        if config.request_timeout_secs == 0 {
            return Err(DnsError::Config(
                "caddy.request_timeout_secs must be greater than zero".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            admin_url: config.admin_url.clone(),
            store,
            in_flight: Mutex::new(()),
        })
    }

    /// The table this fetcher writes to.
    pub fn store(&self) -> &BindingTable {
        &self.store
    }

    /// Run one fetch/decode/extract/swap cycle.
    ///
    /// On error the table is left untouched. Returns
    /// [`RefreshOutcome::Skipped`] if another cycle is still running.
    pub async fn refresh(&self) -> Result<RefreshOutcome, DnsError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("refresh already in flight, skipping");
            metrics::record_refresh(RefreshResult::Skipped, Duration::ZERO);
            return Ok(RefreshOutcome::Skipped);
        };

        let timer = Timer::start();

        let body = match self.fetch().await {
            Ok(body) => body,
            Err(e) => {
                metrics::record_refresh(RefreshResult::TransportError, timer.elapsed());
                return Err(e);
            }
        };

        let config = match caddy::decode(&body) {
            Ok(config) => config,
            Err(e) => {
                metrics::record_refresh(RefreshResult::DecodeError, timer.elapsed());
                return Err(e.into());
            }
        };

        let extraction = caddy::extract_bindings(&config);
        let bindings = extraction.bindings.len();
        let generation = self.store.replace(extraction.bindings);
        self.store.emit_metrics();

        if extraction.mismatches.is_empty() {
            metrics::record_refresh(RefreshResult::Applied, timer.elapsed());
        } else {
            for mismatch in &extraction.mismatches {
                warn!(%mismatch, "admin config section skipped");
            }
            metrics::record_structure_mismatch(extraction.mismatches.len());
            metrics::record_refresh(RefreshResult::Partial, timer.elapsed());
        }

        debug!(bindings, generation, "refresh applied");
        Ok(RefreshOutcome::Applied {
            bindings,
            generation,
            mismatches: extraction.mismatches,
        })
    }

    async fn fetch(&self) -> Result<Vec<u8>, DnsError> {
        let response = self
            .client
            .get(&self.admin_url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Background task that refreshes the table on a fixed period.
///
/// Cycles run inline in the task, so a slow cycle delays (and skips) ticks
/// instead of overlapping the next one.
pub struct RefreshTask {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl RefreshTask {
    /// Spawn the task. The first tick fires one `period` from now.
    pub fn spawn(fetcher: Arc<RefreshFetcher>, period: Duration, token: CancellationToken) -> Self {
        let handle = tokio::spawn(refresh_loop(fetcher, period, token.clone()));
        Self { handle, token }
    }

    /// Ask the task to stop. An in-flight cycle is abandoned before it swaps.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Wait for the task to exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!("refresh task panicked: {}", e);
        }
    }
}

async fn refresh_loop(fetcher: Arc<RefreshFetcher>, period: Duration, token: CancellationToken) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_secs = period.as_secs_f64(), "refresh task started");

    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                info!("refresh task shutting down");
                return;
            }

            _ = interval.tick() => {
                tokio::select! {
                    biased;

                    _ = token.cancelled() => {
                        info!("refresh task shutting down during refresh");
                        return;
                    }

                    result = fetcher.refresh() => match result {
                        Ok(RefreshOutcome::Applied { bindings, generation, .. }) => {
                            debug!(bindings, generation, "periodic refresh complete");
                        }
                        Ok(RefreshOutcome::Skipped) => {}
                        Err(e) => {
                            warn!(
                                error = %e,
                                retained = fetcher.store().len(),
                                "periodic refresh failed, keeping previous bindings"
                            );
                        }
                    },
                }
            }
        }
    }
}
