//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    ADMISSION_REJECTED_TOTAL, BROADCAST_DELIVERED_TOTAL, BROADCAST_FAILED_TOTAL,
    CONNECTIONS_ACTIVE, RATELIMIT_ALLOWED_TOTAL, RATELIMIT_DENIED_TOTAL, WS_CONNECTIONS_CLOSED,
    WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
        CONNECTIONS_ACTIVE.inc();
    }

    /// Called once per connection, by whoever removed it from the registry
    pub fn record_closed() {
        WS_CONNECTIONS_CLOSED.inc();
        CONNECTIONS_ACTIVE.dec();
    }

    pub fn record_duration(seconds: f64) {
        WS_CONNECTION_DURATION.observe(seconds);
    }
}

/// Helper struct for upgrade rejections
pub struct AdmissionMetrics;

impl AdmissionMetrics {
    pub fn record_rejected(reason: &str) {
        ADMISSION_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for inbound WebSocket frame metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_received(kind: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[kind]).inc();
    }

    pub fn record_invalid() {
        WS_MESSAGES_RECEIVED.with_label_values(&["invalid"]).inc();
    }
}

/// Helper struct for broadcast delivery metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record(kind: &str, delivered: u64, failed: u64) {
        if delivered > 0 {
            BROADCAST_DELIVERED_TOTAL
                .with_label_values(&[kind])
                .inc_by(delivered);
        }
        if failed > 0 {
            BROADCAST_FAILED_TOTAL.with_label_values(&[kind]).inc_by(failed);
        }
    }
}

/// Helper struct for recording rate limit metrics
pub struct RateLimitMetrics;

impl RateLimitMetrics {
    pub fn record_allowed() {
        RATELIMIT_ALLOWED_TOTAL.inc();
    }

    pub fn record_denied() {
        RATELIMIT_DENIED_TOTAL.inc();
    }
}
