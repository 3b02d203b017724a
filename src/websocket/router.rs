use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use crate::connection_manager::{ConnectionHandle, ConnectionRegistry};
use crate::metrics::{BroadcastMetrics, ConnectionMetrics};

use super::message::{OutboundMessage, ServerMessage};

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastResult {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans frames out to the other connections in a room.
///
/// Delivery is best-effort per recipient. A recipient whose queue is closed
/// or stays full past `send_timeout` is evicted with the full close sequence
/// (unregister, then `user_disconnected` to whoever is left), and delivery to
/// the remaining recipients carries on.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    send_timeout: Duration,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// Send `message` to every live connection in `room_id` except `exclude`.
    pub async fn broadcast(
        &self,
        room_id: &str,
        exclude: Option<Uuid>,
        message: ServerMessage,
    ) -> BroadcastResult {
        let (delivered, failed) = self.deliver(room_id, exclude, &message).await;
        let result = BroadcastResult {
            delivered,
            failed: failed.len(),
        };
        self.evict(failed).await;
        result
    }

    /// Run the close sequence for a connection: unregister it and announce
    /// the departure to its room. Returns `None` if it was already gone, in
    /// which case nothing is announced.
    pub async fn disconnect(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let removed = self.registry.unregister(connection_id)?;
        ConnectionMetrics::record_closed();

        let leave = ServerMessage::user_disconnected(&removed.principal_id);
        let (_, failed) = self.deliver(&removed.room_id, None, &leave).await;
        self.evict(failed).await;

        Some(removed)
    }

    async fn deliver(
        &self,
        room_id: &str,
        exclude: Option<Uuid>,
        message: &ServerMessage,
    ) -> (usize, Vec<Arc<ConnectionHandle>>) {
        let recipients: Vec<_> = self
            .registry
            .connections_in_room(room_id)
            .into_iter()
            .filter(|conn| Some(conn.id) != exclude)
            .collect();

        if recipients.is_empty() {
            return (0, Vec::new());
        }

        // Serialize once and share the text across all recipients
        let outbound = match OutboundMessage::preserialized(message) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::error!(error = %e, "Failed to pre-serialize message, falling back to per-connection serialization");
                OutboundMessage::Raw(message.clone())
            }
        };

        let sends = recipients.into_iter().map(|conn| {
            let msg = outbound.clone();
            async move {
                let result = conn.send_with_timeout(msg, self.send_timeout).await;
                (conn, result)
            }
        });

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (conn, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %conn.id,
                        room_id = %room_id,
                        error = %e,
                        "Broadcast delivery failed, evicting recipient"
                    );
                    failed.push(conn);
                }
            }
        }

        BroadcastMetrics::record(message.kind(), delivered as u64, failed.len() as u64);

        (delivered, failed)
    }

    async fn evict(&self, mut pending: Vec<Arc<ConnectionHandle>>) {
        // Announcing one eviction can surface further dead recipients, so
        // work through them iteratively
        while let Some(conn) = pending.pop() {
            let Some(removed) = self.registry.unregister(conn.id) else {
                continue;
            };
            removed.request_close();
            ConnectionMetrics::record_closed();

            let leave = ServerMessage::user_disconnected(&removed.principal_id);
            let (_, failed) = self.deliver(&removed.room_id, None, &leave).await;
            pending.extend(failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::ConnectionLimits;
    use crate::ratelimit::{RateLimitConfig, RateLimiter};
    use tokio::sync::mpsc;

    fn setup() -> (Arc<ConnectionRegistry>, MessageRouter) {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let registry = Arc::new(ConnectionRegistry::new(
            ConnectionLimits::default(),
            limiter,
        ));
        let router = MessageRouter::new(registry.clone(), Duration::from_millis(50));
        (registry, router)
    }

    fn connect(
        registry: &ConnectionRegistry,
        room: &str,
        principal: &str,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = registry
            .register(room.to_string(), principal.to_string(), tx)
            .unwrap();
        (handle, rx)
    }

    fn next_frame(rx: &mut mpsc::Receiver<OutboundMessage>) -> Option<ServerMessage> {
        rx.try_recv()
            .ok()
            .map(|m| serde_json::from_str(&m.to_json().unwrap()).unwrap())
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let (registry, router) = setup();
        let (a, mut rx_a) = connect(&registry, "ticket-1", "user-a");
        let (_b, mut rx_b) = connect(&registry, "ticket-1", "user-b");
        let (_c, mut rx_c) = connect(&registry, "ticket-1", "user-c");
        let (_d, mut rx_d) = connect(&registry, "ticket-2", "user-d");

        let result = router
            .broadcast("ticket-1", Some(a.id), ServerMessage::chat("user-a", "hello"))
            .await;

        assert_eq!(result, BroadcastResult { delivered: 2, failed: 0 });
        assert!(next_frame(&mut rx_a).is_none());
        assert!(next_frame(&mut rx_d).is_none());
        for rx in [&mut rx_b, &mut rx_c] {
            match next_frame(rx) {
                Some(ServerMessage::Message { principal_id, content, .. }) => {
                    assert_eq!(principal_id, "user-a");
                    assert_eq!(content, "hello");
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_recipient_is_evicted_and_others_still_served() {
        let (registry, router) = setup();
        let (a, _rx_a) = connect(&registry, "ticket-1", "user-a");
        let (dead, rx_dead) = connect(&registry, "ticket-1", "user-dead");
        let (_c, mut rx_c) = connect(&registry, "ticket-1", "user-c");
        drop(rx_dead);

        let result = router
            .broadcast("ticket-1", Some(a.id), ServerMessage::typing("user-a", true))
            .await;

        assert_eq!(result, BroadcastResult { delivered: 1, failed: 1 });
        assert!(registry.get(dead.id).is_none());
        assert!(dead.is_closing());

        assert!(matches!(next_frame(&mut rx_c), Some(ServerMessage::Typing { .. })));
        match next_frame(&mut rx_c) {
            Some(ServerMessage::UserDisconnected { principal_id, .. }) => {
                assert_eq!(principal_id, "user-dead")
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_announces_once() {
        let (registry, router) = setup();
        let (a, _rx_a) = connect(&registry, "ticket-1", "user-a");
        let (_b, mut rx_b) = connect(&registry, "ticket-1", "user-b");

        assert!(router.disconnect(a.id).await.is_some());
        assert!(router.disconnect(a.id).await.is_none());

        assert!(matches!(
            next_frame(&mut rx_b),
            Some(ServerMessage::UserDisconnected { ref principal_id, .. }) if principal_id == "user-a"
        ));
        assert!(next_frame(&mut rx_b).is_none());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room() {
        let (_registry, router) = setup();
        let result = router
            .broadcast("ticket-none", None, ServerMessage::user_joined("user-a"))
            .await;
        assert_eq!(result, BroadcastResult::default());
    }
}
