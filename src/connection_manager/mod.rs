//! Connection management for WebSocket connections
//!
//! This module provides:
//! - Connection handle management
//! - Room and principal indexing
//! - Concurrent-connection quotas
//! - Connection statistics

mod quota;
mod registry;
mod stats;
mod types;

pub use quota::QuotaEnforcer;
pub use registry::ConnectionRegistry;
pub use stats::ConnectionStats;
pub use types::{ConnectionHandle, ConnectionLimits, QuotaError, TransportError};
