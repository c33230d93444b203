//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gannet_requests_total` (counter): requests by method, status, backend
//! - `gannet_request_duration_seconds` (histogram): proxy latency
//! - `gannet_backend_active_connections` (gauge): distinct identities per
//!   backend, maintained by the accounting
//! - `gannet_backend_sessions_total` (counter): new identities per backend
//! - `gannet_backend_failures_total` (counter): published backend failures

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Failure is logged, not
/// fatal: the proxy keeps serving without metrics exposition.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

/// Record one completed (or failed) proxied request.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    metrics::counter!(
        "gannet_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gannet_request_duration_seconds",
        "backend" => backend.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
