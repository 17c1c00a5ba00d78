//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_connections_total` (counter): accepted connections
//! - `gate_exchanges_total{outcome}` (counter): how each connection ended
//! - `gate_active_relays` (gauge): relays currently pumping bytes
//! - `gate_relay_bytes_total{direction}` (counter): bytes relayed per direction, replayed request included
//!
//! All recorders are no-ops until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_connection() {
    metrics::counter!("gate_connections_total").increment(1);
}

pub fn record_exchange(outcome: &'static str) {
    metrics::counter!("gate_exchanges_total", "outcome" => outcome).increment(1);
}

pub fn relay_started() {
    metrics::gauge!("gate_active_relays").increment(1.0);
}

pub fn relay_finished(client_to_backend: u64, backend_to_client: u64) {
    metrics::gauge!("gate_active_relays").decrement(1.0);
    metrics::counter!("gate_relay_bytes_total", "direction" => "client_to_backend")
        .increment(client_to_backend);
    metrics::counter!("gate_relay_bytes_total", "direction" => "backend_to_client")
        .increment(backend_to_client);
}
