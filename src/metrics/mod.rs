//! Prometheus metrics for the relay gateway.
//!
//! - Connection metrics (active connections, opened/closed, lifetime)
//! - Admission rejections by reason
//! - Inbound frame and broadcast delivery counts
//! - Rate limiting decisions

mod helpers;

pub use helpers::{
    encode_metrics, AdmissionMetrics, BroadcastMetrics, ConnectionMetrics, RateLimitMetrics,
    WsMessageMetrics,
};

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

    /// Number of live WebSocket connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of live WebSocket connections"
    ).unwrap();

    /// Total WebSocket connections opened
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections admitted"
    ).unwrap();

    /// Total WebSocket connections closed
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// Connection lifetime
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Upgrade requests refused before any state was created
    pub static ref ADMISSION_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_admission_rejected_total", METRIC_PREFIX),
        "Upgrade requests rejected by reason",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Inbound frames by type
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Inbound WebSocket frames by type",
        &["type"]
    ).unwrap();

    /// Broadcast frames delivered to recipients
    pub static ref BROADCAST_DELIVERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broadcast_delivered_total", METRIC_PREFIX),
        "Broadcast frames enqueued for recipients",
        &["type"]
    ).unwrap();

    /// Broadcast deliveries that failed and evicted the recipient
    pub static ref BROADCAST_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broadcast_failed_total", METRIC_PREFIX),
        "Broadcast deliveries that failed",
        &["type"]
    ).unwrap();

    // ============================================================================
    // Rate Limiting Metrics
    // ============================================================================

    /// Frames allowed by rate limiter
    pub static ref RATELIMIT_ALLOWED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ratelimit_allowed_total", METRIC_PREFIX),
        "Chargeable frames allowed by the rate limiter"
    ).unwrap();

    /// Frames denied by rate limiter
    pub static ref RATELIMIT_DENIED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_ratelimit_denied_total", METRIC_PREFIX),
        "Chargeable frames denied by the rate limiter"
    ).unwrap();
}
