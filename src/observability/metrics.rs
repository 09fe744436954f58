//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by access decision
//! - `gate_authority_calls_total` (counter): authorization calls by call, result
//! - `gate_render_total` (counter): render outcomes by mode, outcome
//! - `gate_render_ready_seconds` (histogram): time to readiness by mode
//! - `gate_telemetry_dropped_total` (counter): events dropped at the queue

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(decision: &'static str) {
    counter!("gate_requests_total", "decision" => decision).increment(1);
}

pub fn record_authority_call(call: &'static str, result: &'static str) {
    counter!("gate_authority_calls_total", "call" => call, "result" => result).increment(1);
}

pub fn record_render(mode: &'static str, outcome: &'static str, started: Instant) {
    counter!("gate_render_total", "mode" => mode, "outcome" => outcome).increment(1);
    if outcome == "ready" {
        histogram!("gate_render_ready_seconds", "mode" => mode)
            .record(started.elapsed().as_secs_f64());
    }
}

pub fn record_telemetry_dropped() {
    counter!("gate_telemetry_dropped_total").increment(1);
}
