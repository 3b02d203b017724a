//! Concurrent-connection quota checks

use super::registry::ConnectionRegistry;
use super::types::{ConnectionLimits, QuotaError};

/// Decides whether one more connection fits under the per-principal and
/// per-room ceilings. Counts come from the registry's indexes.
#[derive(Debug, Clone, Copy)]
pub struct QuotaEnforcer {
    limits: ConnectionLimits,
}

impl QuotaEnforcer {
    pub fn new(limits: ConnectionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ConnectionLimits {
        self.limits
    }

    /// Check that `principal_id` may open another connection in `room_id`.
    ///
    /// The principal limit is checked first, so a request that violates both
    /// reports the principal limit.
    pub fn check(
        &self,
        principal_id: &str,
        room_id: &str,
        registry: &ConnectionRegistry,
    ) -> Result<(), QuotaError> {
        let principal_count = registry.principal_connection_count(principal_id);
        if principal_count >= self.limits.max_connections_per_principal {
            return Err(QuotaError::PrincipalLimitExceeded {
                principal_id: principal_id.to_string(),
                current: principal_count,
                max: self.limits.max_connections_per_principal,
            });
        }

        let room_count = registry.room_connection_count(room_id);
        if room_count >= self.limits.max_connections_per_room {
            return Err(QuotaError::RoomLimitExceeded {
                room_id: room_id.to_string(),
                current: room_count,
                max: self.limits.max_connections_per_room,
            });
        }

        Ok(())
    }
}

impl Default for QuotaEnforcer {
    fn default() -> Self {
        Self::new(ConnectionLimits::default())
    }
}
