//! Request handler that answers address queries from the binding table.

use async_trait::async_trait;
use hickory_proto::op::{Header, Query};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{DNSClass, RData, Record, RecordType};
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::IpAddr;
use tracing::{debug, error, trace};

use crate::chain::{next_or_failure, PLUGIN_NAME};
use crate::error::DnsError;
use crate::metrics::{self, QueryResult, Timer};
use crate::state::BindingTable;

/// Interceptor placed in front of `next` in the handler chain.
///
/// A/AAAA queries whose name is bound in the table are answered directly;
/// everything else is passed to `next` untouched.
pub struct ProxyInterceptor<N> {
    store: BindingTable,
    ttl: u32,
    next: Option<N>,
}

/// Why a query is passed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delegation {
    NoQuestion,
    NotAddressType,
    NotReady,
    Miss,
    FamilyMismatch,
    InvalidAddress,
}

impl<N> ProxyInterceptor<N> {
    /// Create an interceptor over `store` that delegates to `next`.
    pub fn new(store: BindingTable, ttl: u32, next: Option<N>) -> Self {
        Self { store, ttl, next }
    }

    /// Handler name used in diagnostics and chaining.
    pub fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// The next handler, if any.
    pub fn next(&self) -> Option<&N> {
        self.next.as_ref()
    }

    /// Resolve a question against the table.
    fn resolve(&self, query: &Query) -> Result<Record, Delegation> {
        let rtype = query.query_type();
        if !matches!(rtype, RecordType::A | RecordType::AAAA) {
            return Err(Delegation::NotAddressType);
        }
        if !self.store.is_ready() {
            return Err(Delegation::NotReady);
        }

        let name = query.name().to_string();
        let Some(address) = self.store.lookup(&name) else {
            return Err(Delegation::Miss);
        };

        match address_record(query, &address, self.ttl) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => {
                debug!(name = %name, address = %address, rtype = ?rtype, "binding has other address family");
                Err(Delegation::FamilyMismatch)
            }
            Err(e) => {
                debug!(error = %e, "ignoring binding with invalid address");
                Err(Delegation::InvalidAddress)
            }
        }
    }
}

/// Build the answer record for `query` from a stored address.
///
/// Returns `Ok(None)` when the address family does not match the requested
/// record type.
pub fn address_record(query: &Query, address: &str, ttl: u32) -> Result<Option<Record>, DnsError> {
    let ip: IpAddr = address.parse().map_err(|source| DnsError::AddressParse {
        name: query.name().to_string(),
        address: address.to_string(),
        source,
    })?;

    let rdata = match (query.query_type(), ip) {
        (RecordType::A, IpAddr::V4(v4)) => RData::A(A::from(v4)),
        (RecordType::AAAA, IpAddr::V6(v6)) => RData::AAAA(AAAA::from(v6)),
        _ => return Ok(None),
    };

    let mut record = Record::from_rdata(query.name().clone(), ttl, rdata);
    record.set_dns_class(DNSClass::IN);
    Ok(Some(record))
}

#[async_trait]
impl<N: RequestHandler> RequestHandler for ProxyInterceptor<N> {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> ResponseInfo {
        let timer = Timer::start();

        let resolution = match request.queries().first() {
            Some(query) => self.resolve(query.original()),
            None => Err(Delegation::NoQuestion),
        };
        let rtype_str = request
            .queries()
            .first()
            .map(|q| format!("{:?}", q.query_type()))
            .unwrap_or_else(|| "none".to_string());

        let record = match resolution {
            Ok(record) => record,
            Err(reason) => {
                trace!(reason = ?reason, rtype = %rtype_str, "delegating query");
                let result = if reason == Delegation::InvalidAddress {
                    QueryResult::InvalidAddress
                } else {
                    QueryResult::Delegated
                };
                metrics::record_query(&rtype_str, result, timer.elapsed());
                return next_or_failure(self.name(), self.next(), request, response_handle).await;
            }
        };

        debug!(name = %record.name(), rtype = %rtype_str, "answering from binding table");

        let header = Header::response_from_request(request.header());
        let answers = [record];
        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(
            header,
            answers.iter(),
            std::iter::empty(),
            std::iter::empty(),
            std::iter::empty(),
        );

        match response_handle.send_response(response).await {
            Ok(info) => {
                metrics::record_query(&rtype_str, QueryResult::Answered, timer.elapsed());
                info
            }
            Err(e) => {
                error!(error = %e, "failed to send answer");
                metrics::record_query(&rtype_str, QueryResult::Error, timer.elapsed());
                ResponseInfo::from(header)
            }
        }
    }
}
