//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_requests_total` (counter): handled requests by endpoint, status
//! - `service_request_duration_seconds` (histogram): handler latency
//! - `service_calls_total` (counter): outbound calls by service, endpoint, status
//! - `service_call_duration_seconds` (histogram): outbound call latency
//! - `service_hook_failures_total` (counter): lifecycle hook failures by phase
//!
//! Recording is a no-op until a recorder is installed with [`init_metrics`].

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(endpoint: &str, status: &'static str, start: Instant) {
    ::metrics::counter!(
        "service_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status
    )
    .increment(1);
    ::metrics::histogram!(
        "service_request_duration_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_call(service: &str, endpoint: &str, status: &'static str, start: Instant) {
    ::metrics::counter!(
        "service_calls_total",
        "service" => service.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status
    )
    .increment(1);
    ::metrics::histogram!(
        "service_call_duration_seconds",
        "service" => service.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_hook_failure(phase: &'static str) {
    ::metrics::counter!("service_hook_failures_total", "phase" => phase).increment(1);
}
