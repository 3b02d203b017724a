use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection_manager::{ConnectionHandle, TransportError};
use crate::error::AppError;
use crate::metrics::{AdmissionMetrics, ConnectionMetrics, RateLimitMetrics, WsMessageMetrics};
use crate::ratelimit::RateLimitError;
use crate::server::AppState;

use super::message::{validate_content, ClientMessage, OutboundMessage, ProtocolError, ServerMessage};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub room_id: Option<String>,
    pub token: Option<String>,
}

/// WebSocket upgrade handler
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(room_id = ?query.room_id, has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    upgrade(ws, state, &query, &headers)
        .await
        .inspect_err(|e| AdmissionMetrics::record_rejected(e.reason()))
}

/// Run the admission pipeline: parameters, upgrade check, authentication,
/// quota. The socket is only upgraded once all of them pass.
async fn upgrade(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    state: AppState,
    query: &WsQuery,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let (room_id, token) = extract_params(query, headers)?;

    let ws = ws.map_err(|e| {
        tracing::debug!(error = %e, "Request on realtime path is not a WebSocket upgrade");
        AppError::UpgradeRequired
    })?;

    let principal_id = admit(&state, &room_id, &token).await?;

    tracing::info!(principal_id = %principal_id, room_id = %room_id, "WebSocket upgrade accepted");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, principal_id)))
}

/// Pull `roomId` and the bearer token out of the request.
///
/// The token comes from the `token` query parameter, falling back to an
/// `Authorization: Bearer` header.
fn extract_params(query: &WsQuery, headers: &HeaderMap) -> Result<(String, String), AppError> {
    // Room ids are opaque; blank ones are refused but others pass through as-is
    let room_id = query
        .room_id
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .ok_or(AppError::MissingParameter("roomId"))?;

    let token = match query.token {
        Some(ref token) => token.clone(),
        None => headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(AppError::MissingParameter("token"))?,
    };

    Ok((room_id.to_string(), token))
}

/// Authenticate and quota-check a connection attempt. Nothing is registered
/// here; a rejection leaves no trace in the registry.
pub async fn admit(state: &AppState, room_id: &str, token: &str) -> Result<String, AppError> {
    let principal_id = state.auth_gate.authenticate(token).await?;
    state.registry.check_admission(&principal_id, room_id)?;
    Ok(principal_id)
}

/// Handle an established WebSocket connection
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state)
)]
async fn handle_socket(socket: WebSocket, state: AppState, room_id: String, principal_id: String) {
    let connection_start = std::time::Instant::now();

    // Create channel for sending messages to this connection
    let (tx, mut rx) =
        mpsc::channel::<OutboundMessage>(state.settings.websocket.outbound_buffer.max(1));

    // `connected` goes on the queue before the connection becomes visible to
    // peers, so no broadcast can overtake it
    let connection_id = Uuid::new_v4();
    if let Err(e) = tx.try_send(OutboundMessage::Raw(ServerMessage::connected(
        connection_id,
        room_id.clone(),
    ))) {
        tracing::error!(connection_id = %connection_id, error = %e, "Failed to queue connected frame");
        return;
    }

    // Quotas are re-checked atomically; a concurrent upgrade may have taken the last slot
    let handle = match state.registry.register_with_id(
        connection_id,
        room_id.clone(),
        principal_id.clone(),
        tx,
    ) {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(principal_id = %principal_id, room_id = %room_id, error = %e, "Connection rejected");
            AdmissionMetrics::record_rejected("quota");
            let (mut ws_sender, _) = socket.split();
            if let Ok(json) = serde_json::to_string(&ServerMessage::from(&e)) {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            let _ = ws_sender.close().await;
            return;
        }
    };

    ConnectionMetrics::record_opened();

    tracing::info!(
        connection_id = %connection_id,
        principal_id = %principal_id,
        room_id = %room_id,
        "WebSocket connection established"
    );

    // Split socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages from channel to WebSocket; the only writer
    // of this socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                tracing::debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    state
        .router
        .broadcast(&room_id, Some(connection_id), ServerMessage::user_joined(&principal_id))
        .await;

    loop {
        // Close requests win over pending frames
        tokio::select! {
            biased;

            _ = handle.close_requested() => {
                tracing::debug!(connection_id = %connection_id, "Close requested");
                break;
            }
            _ = &mut send_task => {
                tracing::debug!(connection_id = %connection_id, "Send task completed");
                break;
            }
            frame = ws_receiver.next() => match frame {
                Some(Ok(msg)) => {
                    // One frame, including its broadcast, finishes before the next read
                    if !process_message(msg, &state, &handle).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    let err = TransportError::Socket(e.to_string());
                    tracing::warn!(connection_id = %connection_id, error = %err, "WebSocket receive error");
                    break;
                }
                None => break,
            },
        }
    }

    handle.mark_closing();
    state.router.disconnect(connection_id).await;
    send_task.abort();

    let duration = connection_start.elapsed().as_secs_f64();
    ConnectionMetrics::record_duration(duration);

    tracing::info!(
        connection_id = %connection_id,
        principal_id = %principal_id,
        room_id = %room_id,
        messages = handle.message_count(),
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    // Evicted or shutting down: the room has already been told this
    // connection left, so nothing it sends may be charged or relayed
    if handle.is_closing() {
        return false;
    }

    let result = match msg {
        Message::Text(text) => {
            handle.record_inbound();

            match ClientMessage::parse(text.as_str()) {
                Ok(client_msg) => handle_client_message(client_msg, state, handle).await,
                Err(e) => {
                    WsMessageMetrics::record_invalid();
                    tracing::debug!(connection_id = %handle.id, error = %e, "Rejected client frame");
                    reply(state, handle, ServerMessage::from(&e)).await
                }
            }
        }
        Message::Binary(_) => {
            WsMessageMetrics::record_invalid();
            reply(state, handle, ServerMessage::from(&ProtocolError::UnsupportedFormat)).await
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers transport pings itself; only activity matters here
            handle.update_activity();
            Ok(())
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            return false;
        }
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(connection_id = %handle.id, error = %e, "Own socket unavailable");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(msg, state, handle),
    fields(
        connection_id = %handle.id,
        principal_id = %handle.principal_id,
        message_type = msg.kind()
    )
)]
async fn handle_client_message(
    msg: ClientMessage,
    state: &AppState,
    handle: &Arc<ConnectionHandle>,
) -> Result<(), TransportError> {
    WsMessageMetrics::record_received(msg.kind());

    // Content is validated before charging, so a rejected frame costs nothing
    if let ClientMessage::Message { ref content } = msg {
        if let Err(e) = validate_content(content, state.settings.limits.max_message_bytes) {
            return reply(state, handle, ServerMessage::from(&e)).await;
        }
    }

    if msg.is_chargeable() {
        if let Err(e) = charge(state, handle) {
            return reply(state, handle, ServerMessage::from(&e)).await;
        }
    }

    let broadcast = match msg {
        ClientMessage::Ping => return reply(state, handle, ServerMessage::pong()).await,
        ClientMessage::Message { content } => ServerMessage::chat(&handle.principal_id, content),
        ClientMessage::Typing { is_typing } => {
            ServerMessage::typing(&handle.principal_id, is_typing)
        }
    };

    state
        .router
        .broadcast(&handle.room_id, Some(handle.id), broadcast)
        .await;
    Ok(())
}

/// Queue a frame for the connection itself.
///
/// Bounded by `send_timeout_ms`: a client that stops reading fails here
/// instead of stalling its read loop.
async fn reply(
    state: &AppState,
    handle: &ConnectionHandle,
    message: ServerMessage,
) -> Result<(), TransportError> {
    let timeout = Duration::from_millis(state.settings.websocket.send_timeout_ms);
    handle
        .send_with_timeout(OutboundMessage::Raw(message), timeout)
        .await
}

/// Charge one frame against the sender's shared budget
fn charge(state: &AppState, handle: &ConnectionHandle) -> Result<(), RateLimitError> {
    match state.rate_limiter.check(&handle.principal_id).into_result() {
        Ok(()) => {
            RateLimitMetrics::record_allowed();
            Ok(())
        }
        Err(e) => {
            RateLimitMetrics::record_denied();
            tracing::warn!(
                connection_id = %handle.id,
                principal_id = %handle.principal_id,
                reset_at = e.reset_at,
                "Frame rate limit exceeded"
            );
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::http::HeaderValue;

    fn state_with(settings: Settings) -> AppState {
        AppState::new(settings).unwrap()
    }

    fn open(
        state: &AppState,
        principal: &str,
        buffer: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = state
            .registry
            .register("ticket-1".into(), principal.into(), tx)
            .unwrap();
        (handle, rx)
    }

    fn next_frame(rx: &mut mpsc::Receiver<OutboundMessage>) -> Option<ServerMessage> {
        rx.try_recv()
            .ok()
            .map(|m| serde_json::from_str(&m.to_json().unwrap()).unwrap())
    }

    fn text(json: &str) -> Message {
        Message::Text(json.into())
    }

    #[tokio::test]
    async fn test_ping_answered_without_charge() {
        let state = state_with(Settings::default());
        let (a, mut rx_a) = open(&state, "user-a", 8);

        assert!(process_message(text(r#"{"type":"ping"}"#), &state, &a).await);

        assert!(matches!(next_frame(&mut rx_a), Some(ServerMessage::Pong { .. })));
        assert_eq!(state.rate_limiter.current_count("user-a"), 0);
        assert_eq!(a.message_count(), 1);
    }

    #[tokio::test]
    async fn test_frames_from_closing_connection_are_dropped() {
        let state = state_with(Settings::default());
        let (a, _rx_a) = open(&state, "user-a", 8);
        let (_b, mut rx_b) = open(&state, "user-b", 8);

        // Evicted: unregistered and already announced to the room
        state.router.disconnect(a.id).await;
        assert!(matches!(
            next_frame(&mut rx_b),
            Some(ServerMessage::UserDisconnected { .. })
        ));

        let keep_open = process_message(
            text(r#"{"type":"message","content":"late"}"#),
            &state,
            &a,
        )
        .await;

        assert!(!keep_open);
        assert!(next_frame(&mut rx_b).is_none());
        assert_eq!(state.rate_limiter.current_count("user-a"), 0);
        assert_eq!(state.rate_limiter.stats().trackers, 0);
    }

    #[tokio::test]
    async fn test_stalled_client_reply_closes_connection() {
        let mut settings = Settings::default();
        settings.websocket.send_timeout_ms = 50;
        let state = state_with(settings);

        // Queue of one, already full, nobody draining it
        let (a, _rx_a) = open(&state, "user-a", 1);
        a.sender
            .try_send(OutboundMessage::Raw(ServerMessage::pong()))
            .unwrap();

        let keep_open = tokio::time::timeout(
            Duration::from_secs(1),
            process_message(text(r#"{"type":"ping"}"#), &state, &a),
        )
        .await
        .expect("reply should give up after send_timeout_ms");

        assert!(!keep_open);
    }

    #[test]
    fn test_room_id_passed_through_unchanged() {
        let (room, _) =
            extract_params(&query(Some(" ticket-1"), Some("abc")), &HeaderMap::new()).unwrap();
        assert_eq!(room, " ticket-1");
    }

    fn query(room_id: Option<&str>, token: Option<&str>) -> WsQuery {
        WsQuery {
            room_id: room_id.map(str::to_string),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_extract_params_from_query() {
        let (room, token) =
            extract_params(&query(Some("ticket-1"), Some("abc")), &HeaderMap::new()).unwrap();
        assert_eq!(room, "ticket-1");
        assert_eq!(token, "abc");
    }

    #[test]
    fn test_extract_token_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header-token"),
        );

        let (_, token) = extract_params(&query(Some("ticket-1"), None), &headers).unwrap();
        assert_eq!(token, "header-token");
    }

    #[test]
    fn test_missing_params() {
        let err = extract_params(&query(None, Some("abc")), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::MissingParameter("roomId")));

        let err = extract_params(&query(Some("  "), Some("abc")), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::MissingParameter("roomId")));

        let err = extract_params(&query(Some("ticket-1"), None), &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::MissingParameter("token")));
    }
}
