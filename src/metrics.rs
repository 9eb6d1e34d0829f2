//! Metrics instrumentation for caddy-dns.
//!
//! All metrics are prefixed with `caddy_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a DNS query seen by the interceptor.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Answered => "answered",
        QueryResult::Delegated => "delegated",
        QueryResult::InvalidAddress => "invalid_address",
        QueryResult::Error => "error",
    };

    counter!("caddy_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("caddy_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Answered from the binding table.
    Answered,
    /// Passed to the next handler.
    Delegated,
    /// Binding found but its address did not parse; passed on.
    InvalidAddress,
    /// Answer could not be written.
    Error,
}

/// Record the end of a refresh cycle.
pub fn record_refresh(result: RefreshResult, duration: std::time::Duration) {
    let result_str = match result {
        RefreshResult::Applied => "applied",
        RefreshResult::Partial => "partial",
        RefreshResult::Skipped => "skipped",
        RefreshResult::TransportError => "transport_error",
        RefreshResult::DecodeError => "decode_error",
    };

    counter!("caddy_dns.refresh.count", "result" => result_str).increment(1);
    histogram!("caddy_dns.refresh.duration.seconds").record(duration.as_secs_f64());
}

/// Refresh cycle outcomes.
#[derive(Debug, Clone, Copy)]
pub enum RefreshResult {
    /// Table replaced from a complete document.
    Applied,
    /// Table replaced, but some sections were missing or malformed.
    Partial,
    /// Another cycle was still running.
    Skipped,
    /// Admin endpoint unreachable, timed out or returned an error status.
    TransportError,
    /// Admin endpoint body was not valid JSON.
    DecodeError,
}

/// Record a skipped or malformed config section.
pub fn record_structure_mismatch(count: usize) {
    counter!("caddy_dns.refresh.structure_mismatch.count").increment(count as u64);
}

/// Record binding table state (call on change or periodically).
pub fn record_table_state(bindings: usize, generation: u64, ready: bool) {
    gauge!("caddy_dns.table.bindings.count").set(bindings as f64);
    gauge!("caddy_dns.table.generation").set(generation as f64);
    gauge!("caddy_dns.table.ready").set(if ready { 1.0 } else { 0.0 });
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
