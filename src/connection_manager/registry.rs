use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ratelimit::RateLimiter;
use crate::websocket::OutboundMessage;

use super::quota::QuotaEnforcer;
use super::stats::ConnectionStats;
use super::types::{ConnectionHandle, ConnectionLimits, QuotaError};

/// Authoritative map of live connections.
///
/// A connection lives under `(room_id, connection_id)`: the primary map is
/// keyed by connection id and the room index groups ids per room. Mutations
/// of the indexes are serialized by `admission`, which is what makes the
/// quota check and the insert a single atomic step.
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// room_id -> Set<connection_id>
    room_index: DashMap<String, HashSet<Uuid>>,
    /// principal_id -> Set<connection_id> (supports multiple devices)
    principal_index: DashMap<String, HashSet<Uuid>>,
    admission: Mutex<()>,
    quota: QuotaEnforcer,
    rate_limiter: Arc<RateLimiter>,
}

impl ConnectionRegistry {
    pub fn new(limits: ConnectionLimits, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            connections: DashMap::new(),
            room_index: DashMap::new(),
            principal_index: DashMap::new(),
            admission: Mutex::new(()),
            quota: QuotaEnforcer::new(limits),
            rate_limiter,
        }
    }

    pub fn limits(&self) -> ConnectionLimits {
        self.quota.limits()
    }

    /// Pre-upgrade quota check. Advisory: `register` repeats it atomically.
    pub fn check_admission(&self, principal_id: &str, room_id: &str) -> Result<(), QuotaError> {
        self.quota.check(principal_id, room_id, self)
    }

    /// Register a new connection if it fits under both quotas
    pub fn register(
        &self,
        room_id: String,
        principal_id: String,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<Arc<ConnectionHandle>, QuotaError> {
        self.register_with_id(Uuid::new_v4(), room_id, principal_id, sender)
    }

    /// Register under a pre-allocated id.
    ///
    /// Lets the caller queue frames on `sender` that must reach the client
    /// before anything a peer can broadcast once the connection is visible.
    pub fn register_with_id(
        &self,
        connection_id: Uuid,
        room_id: String,
        principal_id: String,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Result<Arc<ConnectionHandle>, QuotaError> {
        let _guard = self.admission.lock().unwrap_or_else(|e| e.into_inner());

        self.quota.check(&principal_id, &room_id, self)?;

        let handle = Arc::new(ConnectionHandle::with_id(
            connection_id,
            room_id,
            principal_id,
            sender,
        ));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());
        self.room_index
            .entry(handle.room_id.clone())
            .or_default()
            .insert(conn_id);
        self.principal_index
            .entry(handle.principal_id.clone())
            .or_default()
            .insert(conn_id);

        tracing::info!(
            connection_id = %conn_id,
            room_id = %handle.room_id,
            principal_id = %handle.principal_id,
            "Connection registered"
        );

        Ok(handle)
    }

    /// Unregister a connection.
    ///
    /// Returns the removed handle on the first call and `None` on every later
    /// call for the same id. When the principal's last connection goes, its
    /// rate limit tracker goes with it.
    pub fn unregister(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let _guard = self.admission.lock().unwrap_or_else(|e| e.into_inner());

        let (_, handle) = self.connections.remove(&connection_id)?;
        handle.mark_closing();

        if let Some(mut room_conns) = self.room_index.get_mut(&handle.room_id) {
            room_conns.remove(&connection_id);
        }
        self.room_index
            .remove_if(&handle.room_id, |_, conns| conns.is_empty());

        if let Some(mut principal_conns) = self.principal_index.get_mut(&handle.principal_id) {
            principal_conns.remove(&connection_id);
        }
        let last_for_principal = self
            .principal_index
            .remove_if(&handle.principal_id, |_, conns| conns.is_empty())
            .is_some();

        if last_for_principal {
            self.rate_limiter.remove(&handle.principal_id);
        }

        tracing::info!(
            connection_id = %connection_id,
            room_id = %handle.room_id,
            principal_id = %handle.principal_id,
            "Connection unregistered"
        );

        Some(handle)
    }

    /// Live connections in a room, skipping any that are tearing down
    pub fn connections_in_room(&self, room_id: &str) -> Vec<Arc<ConnectionHandle>> {
        let ids: Vec<Uuid> = self
            .room_index
            .get(room_id)
            .map(|conn_ids| conn_ids.iter().copied().collect())
            .unwrap_or_default();

        ids.iter()
            .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
            .filter(|h| !h.is_closing())
            .collect()
    }

    pub fn principal_connection_count(&self, principal_id: &str) -> usize {
        self.principal_index
            .get(principal_id)
            .map(|conns| conns.len())
            .unwrap_or(0)
    }

    pub fn room_connection_count(&self, room_id: &str) -> usize {
        self.room_index
            .get(room_id)
            .map(|conns| conns.len())
            .unwrap_or(0)
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// Get all connections
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Connections with no inbound activity for longer than `timeout_secs`
    pub fn stale_connections(&self, timeout_secs: u64) -> Vec<Arc<ConnectionHandle>> {
        let now = chrono::Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total_connections: self.connections.len(),
            unique_principals: self.principal_index.len(),
            unique_rooms: self.room_index.len(),
        }
    }
}
