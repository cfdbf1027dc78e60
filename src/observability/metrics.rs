//! Metrics collection and exposition.
//!
//! # Metrics
//! - `greenlight_requests_total` (counter): requests by method, status
//! - `greenlight_request_duration_seconds` (histogram): latency distribution
//! - `greenlight_rate_limited_total` (counter): admission denials
//! - `greenlight_rate_limiter_clients` (gauge): tracked client buckets
//! - `greenlight_auth_failures_total` (counter): rejected credentials by reason
//! - `greenlight_background_tasks_total` (counter): background tasks by outcome
//! - `greenlight_panics_recovered_total` (counter): handler panics turned into 500s

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "greenlight_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("greenlight_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("greenlight_rate_limited_total").increment(1);
}

pub fn record_limiter_clients(count: usize) {
    metrics::gauge!("greenlight_rate_limiter_clients").set(count as f64);
}

pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!("greenlight_auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_background_task(outcome: &'static str) {
    metrics::counter!("greenlight_background_tasks_total", "outcome" => outcome).increment(1);
}

pub fn record_panic_recovered() {
    metrics::counter!("greenlight_panics_recovered_total").increment(1);
}
