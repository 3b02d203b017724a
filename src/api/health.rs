//! Health check and status endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Operational snapshot of the gateway
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub connections: usize,
    pub unique_users: usize,
    pub unique_tickets: usize,
    pub limits: LimitsResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsResponse {
    pub max_connections_per_user: usize,
    pub max_connections_per_ticket: usize,
    pub max_messages_per_window: u32,
    pub window_ms: u64,
    pub max_message_bytes: usize,
    pub rate_limit_enabled: bool,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatusResponse> {
    let conn_stats = state.registry.stats();
    let limits = state.registry.limits();
    let ratelimit = state.rate_limiter.config();

    Json(StatusResponse {
        connections: conn_stats.total_connections,
        unique_users: conn_stats.unique_principals,
        unique_tickets: conn_stats.unique_rooms,
        limits: LimitsResponse {
            max_connections_per_user: limits.max_connections_per_principal,
            max_connections_per_ticket: limits.max_connections_per_room,
            max_messages_per_window: ratelimit.max_messages_per_window,
            window_ms: ratelimit.window_ms,
            max_message_bytes: state.settings.limits.max_message_bytes,
            rate_limit_enabled: ratelimit.enabled,
        },
    })
}
