//! API layer - HTTP endpoints next to the realtime path.

mod health;
mod metrics;
mod routes;

pub use health::{health, stats, LimitsResponse, StatusResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
