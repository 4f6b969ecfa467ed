//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_captures_started_total` (counter): captures minted by the raw path
//! - `relay_captures_completed_total` (counter): captures acknowledged with End
//! - `relay_captures_unmatched_total` (counter): acknowledgements that found no capture
//! - `relay_correlation_evicted_total` (counter): entries removed other than by
//!   claim, labelled `reason` = replaced | swept | released
//! - `relay_events_published_total` (counter): by `kind`
//! - `relay_event_deliveries_total` (counter): per-viewer deliveries by `kind`
//! - `relay_viewers_evicted_total` (counter): viewers dropped for a full or closed queue
//! - `relay_pending_captures` (gauge): Correlation Table size
//! - `relay_active_connections` (gauge): open client connections
//! - `relay_viewers` (gauge): registered viewers

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_capture_started() {
    counter!("relay_captures_started_total").increment(1);
}

pub fn record_capture_completed() {
    counter!("relay_captures_completed_total").increment(1);
}

pub fn record_capture_unmatched() {
    counter!("relay_captures_unmatched_total").increment(1);
}

pub fn record_capture_abandoned() {
    counter!("relay_captures_abandoned_total").increment(1);
}

pub fn record_correlation_evicted(reason: &'static str, count: usize) {
    counter!("relay_correlation_evicted_total", "reason" => reason).increment(count as u64);
}

pub fn record_pending_captures(count: usize) {
    gauge!("relay_pending_captures").set(count as f64);
}

pub fn record_event_published(kind: &'static str, delivered: usize) {
    counter!("relay_events_published_total", "kind" => kind).increment(1);
    counter!("relay_event_deliveries_total", "kind" => kind).increment(delivered as u64);
}

pub fn record_viewer_evicted() {
    counter!("relay_viewers_evicted_total").increment(1);
}

pub fn record_viewers(count: usize) {
    gauge!("relay_viewers").set(count as f64);
}

pub fn record_active_connections(count: u64) {
    gauge!("relay_active_connections").set(count as f64);
}
