//! Metrics collection and exposition.
//!
//! # Metrics
//! - `interceptor_requests_total` (counter): requests offered to the engine, by outcome
//! - `interceptor_sinks_finished_total` (counter): sinks reaching a terminal state, by state
//! - `interceptor_body_bytes_total` (counter): body bytes handed to the hook
//! - `interceptor_rules` (gauge): registered rules

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::sink::SinkState;

/// Install the Prometheus recorder and its HTTP scrape listener.
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_intercept(outcome: &'static str) {
    counter!("interceptor_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_sink_finished(state: SinkState) {
    counter!("interceptor_sinks_finished_total", "state" => state.as_str()).increment(1);
}

pub fn record_body_bytes(len: usize) {
    counter!("interceptor_body_bytes_total").increment(len as u64);
}

pub fn record_rule_count(count: usize) {
    gauge!("interceptor_rules").set(count as f64);
}
