//! Metrics helpers for fleetlink.
//!
//! Thin wrappers over the `metrics` crate macros. No exporter is embedded;
//! the embedding application installs whichever recorder it wants.
//!
//! Provided metrics:
//! * `fleetlink_requests_total` (counter; path, method, status)
//! * `fleetlink_request_duration_seconds` (histogram; path, method)
//! * `fleetlink_router_ops_total` (counter; op, outcome = ok | degraded | error)
//! * `fleetlink_router_op_duration_seconds` (histogram; op)
//! * `fleetlink_provisioning_failures_total` (counter; kind)
//!
//! The `*Timer` structs record on `Drop`, so early returns are measured too.
use std::time::{Duration, Instant};

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const FLEETLINK_REQUESTS_TOTAL: &str = "fleetlink_requests_total";
pub const FLEETLINK_REQUEST_DURATION_SECONDS: &str = "fleetlink_request_duration_seconds";
pub const FLEETLINK_ROUTER_OPS_TOTAL: &str = "fleetlink_router_ops_total";
pub const FLEETLINK_ROUTER_OP_DURATION_SECONDS: &str = "fleetlink_router_op_duration_seconds";
pub const FLEETLINK_PROVISIONING_FAILURES_TOTAL: &str = "fleetlink_provisioning_failures_total";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        FLEETLINK_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests handled by the portal API."
    );
    describe_histogram!(
        FLEETLINK_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of HTTP requests handled by the portal API."
    );
    describe_counter!(
        FLEETLINK_ROUTER_OPS_TOTAL,
        Unit::Count,
        "Router feature operations by outcome (ok, degraded, error)."
    );
    describe_histogram!(
        FLEETLINK_ROUTER_OP_DURATION_SECONDS,
        Unit::Seconds,
        "Wall time of router feature operations, including dial and login."
    );
    describe_counter!(
        FLEETLINK_PROVISIONING_FAILURES_TOTAL,
        Unit::Count,
        "Router provisioning side effects that were not applied after a committed record."
    );
});

/// Increment the total request counter for an inbound request.
pub fn increment_request_total(path: &str, method: &str, status: u16) {
    counter!(
        FLEETLINK_REQUESTS_TOTAL,
        "path" => path.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed inbound request's duration.
pub fn record_request_duration(path: &str, method: &str, duration: Duration) {
    histogram!(
        FLEETLINK_REQUEST_DURATION_SECONDS,
        "path" => path.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Count a finished router operation.
pub fn increment_router_op(op: &str, outcome: &str) {
    counter!(
        FLEETLINK_ROUTER_OPS_TOTAL,
        "op" => op.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a router operation's duration.
pub fn record_router_op_duration(op: &str, duration: Duration) {
    histogram!(FLEETLINK_ROUTER_OP_DURATION_SECONDS, "op" => op.to_string())
        .record(duration.as_secs_f64());
}

/// Count a provisioning side effect that did not reach the router.
pub fn increment_provisioning_failure(kind: &str) {
    counter!(FLEETLINK_PROVISIONING_FAILURES_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// RAII helper measuring inbound request duration.
pub struct RequestTimer {
    start: Instant,
    path: String,
    method: String,
}

impl RequestTimer {
    pub fn new(path: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            path: path.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.path, &self.method, self.start.elapsed());
    }
}

/// RAII helper measuring a router operation.
pub struct RouterOpTimer {
    start: Instant,
    op: &'static str,
}

impl RouterOpTimer {
    pub fn new(op: &'static str) -> Self {
        Self {
            start: Instant::now(),
            op,
        }
    }
}

impl Drop for RouterOpTimer {
    fn drop(&mut self) {
        record_router_op_duration(self.op, self.start.elapsed());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    Lazy::force(&DESCRIBED);
    tracing::debug!("fleetlink metric descriptions registered");
    Ok(())
}
