//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, RELAY_REQUESTS_TOTAL, SESSIONS_BOUND, SESSION_REGISTRATIONS_TOTAL,
    SESSION_SUPERSESSIONS_TOTAL, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTION_DURATION, WS_FRAMES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
    }

    /// Record a finished connection and its lifetime in seconds
    pub fn record_closed(duration_secs: f64) {
        WS_CONNECTIONS_CLOSED.inc();
        WS_CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn set_active(count: usize) {
        CONNECTIONS_ACTIVE.set(count as i64);
    }
}

pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_registered() {
        SESSION_REGISTRATIONS_TOTAL.inc();
    }

    pub fn record_superseded() {
        SESSION_SUPERSESSIONS_TOTAL.inc();
    }

    pub fn set_bound(count: usize) {
        SESSIONS_BOUND.set(count as i64);
    }
}

/// Inbound frame counters
pub struct FrameMetrics;

impl FrameMetrics {
    /// `kind` is the frame's `type` label (`register`, `ping`, `unknown`)
    pub fn record(kind: &str) {
        WS_FRAMES_RECEIVED.with_label_values(&[kind]).inc();
    }

    pub fn record_invalid() {
        WS_FRAMES_RECEIVED.with_label_values(&["invalid"]).inc();
    }
}

/// Relay outcome counters
pub struct RelayMetrics;

impl RelayMetrics {
    pub fn record_delivered() {
        RELAY_REQUESTS_TOTAL.with_label_values(&["delivered"]).inc();
    }

    /// `kind` is a `RelayError::kind()` label
    pub fn record_failed(kind: &str) {
        RELAY_REQUESTS_TOTAL.with_label_values(&[kind]).inc();
    }
}
