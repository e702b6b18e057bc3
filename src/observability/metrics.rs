//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by route, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency by route
//! - `gateway_attempts_total` (counter): backend attempts by service, outcome
//! - `gateway_clients_created_total` (counter): communication clients created
//! - `gateway_clients_invalidated_total` (counter): communication clients retired
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter owns its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one inbound request.
pub fn record_request(route: &str, status: u16, start: Instant) {
    let route = route.to_string();
    metrics::counter!(
        "gateway_requests_total",
        "route" => route.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

/// Record one backend attempt and how it was classified.
pub fn record_attempt(service: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_attempts_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_client_created() {
    metrics::counter!("gateway_clients_created_total").increment(1);
}

pub fn record_client_invalidated() {
    metrics::counter!("gateway_clients_invalidated_total").increment(1);
}
