//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::websocket::OutboundMessage;

/// Handle for a single WebSocket connection.
///
/// Owned by the [`ConnectionRegistry`](super::ConnectionRegistry). Everything
/// else holds an `Arc` that can only enqueue outbound frames and read
/// bookkeeping; the socket itself lives in the connection's writer task.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub room_id: String,
    pub principal_id: String,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds) - using AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    message_count: AtomicU64,
    closing: AtomicBool,
    close_signal: Notify,
}

impl ConnectionHandle {
    pub fn new(
        room_id: String,
        principal_id: String,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), room_id, principal_id, sender)
    }

    /// Build a handle for an id chosen by the caller
    pub fn with_id(
        id: Uuid,
        room_id: String,
        principal_id: String,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            room_id,
            principal_id,
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            message_count: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            close_signal: Notify::new(),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Record one inbound frame and return the new total
    pub fn record_inbound(&self) -> u64 {
        self.update_activity();
        self.message_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn message_count(&self) -> u64 {
        self.message_count.load(Ordering::Relaxed)
    }

    /// Flag the connection as tearing down. Returns `true` for the caller
    /// that flipped the flag.
    pub fn mark_closing(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Ask the connection's own task to stop its read loop.
    pub fn request_close(&self) {
        self.mark_closing();
        // notify_one stores a permit, so a close requested before the task
        // starts waiting is not lost
        self.close_signal.notify_one();
    }

    /// Resolves once [`request_close`](Self::request_close) has been called.
    pub async fn close_requested(&self) {
        self.close_signal.notified().await;
    }

    /// Enqueue a frame, giving up if the queue stays full for `timeout`
    pub async fn send_with_timeout(
        &self,
        message: OutboundMessage,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.sender
            .send_timeout(message, timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => TransportError::Timeout(timeout),
                mpsc::error::SendTimeoutError::Closed(_) => TransportError::Closed,
            })
    }
}

/// Failure to hand a frame to a connection's socket
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection outbound queue is closed")]
    Closed,
    #[error("Connection outbound queue stayed full for {0:?}")]
    Timeout(Duration),
    #[error("WebSocket transport error: {0}")]
    Socket(String),
}

/// Error returned when a concurrent-connection ceiling would be exceeded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    #[error("Connection limit per user reached ({current}/{max})")]
    PrincipalLimitExceeded {
        principal_id: String,
        current: usize,
        max: usize,
    },
    #[error("Connection limit per ticket reached ({current}/{max})")]
    RoomLimitExceeded {
        room_id: String,
        current: usize,
        max: usize,
    },
}

impl QuotaError {
    /// Which limit was hit: `"principal"` or `"room"`
    pub fn limit(&self) -> &'static str {
        match self {
            Self::PrincipalLimitExceeded { .. } => "principal",
            Self::RoomLimitExceeded { .. } => "room",
        }
    }

    /// The configured ceiling that was hit
    pub fn max(&self) -> usize {
        match self {
            Self::PrincipalLimitExceeded { max, .. } | Self::RoomLimitExceeded { max, .. } => *max,
        }
    }
}

/// Limits for connection management
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_connections_per_principal: usize,
    pub max_connections_per_room: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections_per_principal: 5,
            max_connections_per_room: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::ServerMessage;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(1);
        (
            ConnectionHandle::new("ticket-1".into(), "user-1".into(), tx),
            rx,
        )
    }

    #[test]
    fn test_mark_closing_only_once() {
        let (handle, _rx) = handle();
        assert!(!handle.is_closing());
        assert!(handle.mark_closing());
        assert!(!handle.mark_closing());
        assert!(handle.is_closing());
    }

    #[test]
    fn test_record_inbound_counts() {
        let (handle, _rx) = handle();
        assert_eq!(handle.record_inbound(), 1);
        assert_eq!(handle.record_inbound(), 2);
        assert_eq!(handle.message_count(), 2);
    }

    #[tokio::test]
    async fn test_close_request_before_wait_is_kept() {
        let (handle, _rx) = handle();
        handle.request_close();
        tokio::time::timeout(Duration::from_secs(1), handle.close_requested())
            .await
            .expect("close signal should already be pending");
        assert!(handle.is_closing());
    }

    #[tokio::test]
    async fn test_send_to_closed_queue_fails() {
        let (handle, rx) = handle();
        drop(rx);
        let result = handle
            .send_with_timeout(OutboundMessage::Raw(ServerMessage::pong()), Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_send_with_timeout_on_full_queue() {
        let (handle, _rx) = handle();
        let timeout = Duration::from_millis(10);
        handle
            .send_with_timeout(OutboundMessage::Raw(ServerMessage::pong()), timeout)
            .await
            .unwrap();

        let result = handle
            .send_with_timeout(OutboundMessage::Raw(ServerMessage::pong()), timeout)
            .await;
        assert_eq!(result, Err(TransportError::Timeout(timeout)));
    }

    #[test]
    fn test_quota_error_names_limit() {
        let err = QuotaError::PrincipalLimitExceeded {
            principal_id: "user-1".into(),
            current: 5,
            max: 5,
        };
        assert_eq!(err.limit(), "principal");
        assert_eq!(err.max(), 5);
        assert!(err.to_string().contains("5/5"));

        let err = QuotaError::RoomLimitExceeded {
            room_id: "ticket-1".into(),
            current: 20,
            max: 20,
        };
        assert_eq!(err.limit(), "room");
        assert_eq!(err.max(), 20);
    }
}
