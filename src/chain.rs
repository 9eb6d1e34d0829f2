//! Handler chain glue: delegation helper and plugin setup/registration.

use async_trait::async_trait;
use hickory_proto::op::{Header, ResponseCode};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CaddyConfig;
use crate::error::DnsError;
use crate::handler::ProxyInterceptor;
use crate::refresh::{RefreshFetcher, RefreshOutcome, RefreshTask};
use crate::state::BindingTable;

/// Name the interceptor registers under.
pub const PLUGIN_NAME: &str = "caddydns";

/// Pass `request` to `next`, or answer SERVFAIL when `name` is the last
/// handler in the chain.
pub async fn next_or_failure<N, R>(
    name: &str,
    next: Option<&N>,
    request: &Request,
    response_handle: R,
) -> ResponseInfo
where
    N: RequestHandler,
    R: ResponseHandler,
{
    match next {
        Some(next) => next.handle_request(request, response_handle).await,
        None => {
            warn!(plugin = name, "no next handler in chain");
            send_failure(request, response_handle).await
        }
    }
}

async fn send_failure<R: ResponseHandler>(request: &Request, mut response_handle: R) -> ResponseInfo {
    let mut header = Header::response_from_request(request.header());
    header.set_response_code(ResponseCode::ServFail);
    let response = MessageResponseBuilder::from_message_request(request).build_no_records(header);

    match response_handle.send_response(response).await {
        Ok(info) => info,
        Err(e) => {
            error!(error = %e, "failed to send SERVFAIL");
            ResponseInfo::from(header)
        }
    }
}

/// End of chain: answers every request with SERVFAIL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal;

#[async_trait]
impl RequestHandler for Terminal {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        send_failure(request, response_handle).await
    }
}

/// A set-up plugin: populated table plus running refresh task.
pub struct Plugin {
    store: BindingTable,
    ttl: u32,
    task: RefreshTask,
}

impl Plugin {
    /// Build the table, populate it synchronously and start periodic refresh.
    ///
    /// Fails if the initial refresh fails; the interceptor must not be
    /// registered in that case. The refresh task stops when `shutdown` is
    /// cancelled or [`Plugin::shutdown`] is called.
    pub async fn setup(
        config: &CaddyConfig,
        ttl: u32,
        shutdown: &CancellationToken,
    ) -> Result<Self, DnsError> {
        let store = BindingTable::new();
        let fetcher = RefreshFetcher::new(config, store.clone())
            .map_err(|e| DnsError::setup(PLUGIN_NAME, e))?;

        match fetcher.refresh().await {
            Ok(RefreshOutcome::Applied {
                bindings,
                generation,
                mismatches,
            }) => {
                info!(
                    admin_url = %config.admin_url,
                    bindings,
                    generation,
                    skipped_sections = mismatches.len(),
                    "initial binding sync complete"
                );
            }
            Ok(RefreshOutcome::Skipped) => {
                return Err(DnsError::setup(
                    PLUGIN_NAME,
                    DnsError::Config("initial refresh was skipped".into()),
                ));
            }
            Err(e) => return Err(DnsError::setup(PLUGIN_NAME, e)),
        }

        let task = RefreshTask::spawn(
            Arc::new(fetcher),
            config.refresh_interval(),
            shutdown.child_token(),
        );

        Ok(Self { store, ttl, task })
    }

    /// The binding table served by this plugin.
    pub fn store(&self) -> &BindingTable {
        &self.store
    }

    /// Wire the interceptor in front of `next`.
    pub fn register<N: RequestHandler>(&self, next: N) -> ProxyInterceptor<N> {
        info!(plugin = PLUGIN_NAME, "registering interceptor");
        ProxyInterceptor::new(self.store.clone(), self.ttl, Some(next))
    }

    /// Stop the refresh task and wait for it to exit.
    pub async fn shutdown(self) {
        self.task.stop();
        self.task.join().await;
    }
}
