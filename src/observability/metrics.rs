//! Metrics collection and exposition.
//!
//! # Metrics
//! - `watch_sessions_total` (counter): aggregation sessions established
//! - `watch_sessions_ended_total` (counter): sessions ended, by reason
//! - `watch_backend_streams_active` (gauge): live backend watch streams
//! - `watch_dial_failures_total` (counter): backend dials that failed
//! - `watch_frames_forwarded_total` (counter): data frames written to clients
//! - `watch_frame_bytes_total` (counter): payload bytes written to clients

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus scrape endpoint. Failure is logged, not fatal.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics exporter listening"),
        Err(err) => tracing::error!(error = %err, "failed to install metrics exporter"),
    }
}

pub fn session_established(backends: usize) {
    metrics::counter!("watch_sessions_total").increment(1);
    metrics::histogram!("watch_session_backends").record(backends as f64);
}

pub fn session_ended(reason: &'static str) {
    metrics::counter!("watch_sessions_ended_total", "reason" => reason).increment(1);
}

pub fn backend_stream_opened() {
    metrics::gauge!("watch_backend_streams_active").increment(1.0);
}

pub fn backend_stream_closed() {
    metrics::gauge!("watch_backend_streams_active").decrement(1.0);
}

pub fn dial_failed() {
    metrics::counter!("watch_dial_failures_total").increment(1);
}

pub fn frame_forwarded(bytes: usize) {
    metrics::counter!("watch_frames_forwarded_total").increment(1);
    metrics::counter!("watch_frame_bytes_total").increment(bytes as u64);
}
