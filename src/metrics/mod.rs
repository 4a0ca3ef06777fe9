//! Prometheus metrics for the relay.
//!
//! - Connection metrics (opened, closed, lifetime)
//! - Session metrics (bound sessions, registrations, supersessions)
//! - Inbound frame counts by type
//! - Relay outcomes by result

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, FrameMetrics, RelayMetrics, SessionMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "relay";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Currently tracked WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of currently tracked WebSocket connections"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Sessions currently bound to a connection
    pub static ref SESSIONS_BOUND: IntGauge = register_int_gauge!(
        format!("{}_sessions_bound", METRIC_PREFIX),
        "Number of sessions currently bound to a connection"
    ).unwrap();

    pub static ref SESSION_REGISTRATIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_session_registrations_total", METRIC_PREFIX),
        "Total accepted register frames"
    ).unwrap();

    pub static ref SESSION_SUPERSESSIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_session_supersessions_total", METRIC_PREFIX),
        "Total registrations that closed a previous connection for the same session"
    ).unwrap();

    // ============================================================================
    // Frame Metrics
    // ============================================================================

    pub static ref WS_FRAMES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_frames_received_total", METRIC_PREFIX),
        "Inbound client frames by type",
        &["type"]
    ).unwrap();

    // ============================================================================
    // Relay Metrics
    // ============================================================================

    pub static ref RELAY_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_requests_total", METRIC_PREFIX),
        "Control-plane relay requests by outcome",
        &["result"]
    ).unwrap();
}
