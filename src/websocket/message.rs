use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::connection_manager::QuotaError;
use crate::ratelimit::RateLimitError;

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    Message {
        content: String,
    },
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

impl ClientMessage {
    /// Frame type as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
        }
    }

    /// Whether the frame draws from the sender's rate limit budget
    pub fn is_chargeable(&self) -> bool {
        !matches!(self, Self::Ping)
    }

    /// Parse one inbound text frame.
    ///
    /// Goes through `serde_json::Value` first so an unknown `type` can be
    /// reported by name instead of as a generic decode failure.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;

        match kind {
            "ping" => Ok(Self::Ping),
            "message" => match value.get("content") {
                Some(Value::String(content)) => Ok(Self::Message {
                    content: content.clone(),
                }),
                _ => Err(ProtocolError::InvalidField {
                    field: "content",
                    expected: "a string",
                }),
            },
            "typing" => match value.get("isTyping") {
                Some(Value::Bool(is_typing)) => Ok(Self::Typing {
                    is_typing: *is_typing,
                }),
                _ => Err(ProtocolError::InvalidField {
                    field: "isTyping",
                    expected: "a boolean",
                }),
            },
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Check a `message` frame's content against the size rules
pub fn validate_content(content: &str, max_bytes: usize) -> Result<(), ProtocolError> {
    if content.trim().is_empty() {
        return Err(ProtocolError::EmptyContent);
    }
    if content.len() > max_bytes {
        return Err(ProtocolError::ContentTooLarge {
            size: content.len(),
            max: max_bytes,
        });
    }
    Ok(())
}

/// A frame the connection could not accept. Reported back to the sender
/// as an `error` frame; the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Frame is missing a string 'type' field")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Message content must not be empty")]
    EmptyContent,

    #[error("Message content is {size} bytes, limit is {max}")]
    ContentTooLarge { size: usize, max: usize },

    #[error("Binary messages are not supported")]
    UnsupportedFormat,
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) | Self::MissingType | Self::InvalidField { .. } => "INVALID_FRAME",
            Self::UnknownType(_) => "UNKNOWN_TYPE",
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::ContentTooLarge { .. } => "CONTENT_TOO_LARGE",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected {
        connection_id: Uuid,
        room_id: String,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        principal_id: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        principal_id: String,
        is_typing: bool,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined {
        principal_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UserDisconnected {
        principal_id: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reset_at: Option<i64>,
    },
}

impl ServerMessage {
    pub fn connected(connection_id: Uuid, room_id: impl Into<String>) -> Self {
        Self::Connected {
            connection_id,
            room_id: room_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn chat(principal_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Message {
            principal_id: principal_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn typing(principal_id: impl Into<String>, is_typing: bool) -> Self {
        Self::Typing {
            principal_id: principal_id.into(),
            is_typing,
            timestamp: Utc::now(),
        }
    }

    pub fn user_joined(principal_id: impl Into<String>) -> Self {
        Self::UserJoined {
            principal_id: principal_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_disconnected(principal_id: impl Into<String>) -> Self {
        Self::UserDisconnected {
            principal_id: principal_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: Some(code.into()),
            reset_at: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Pong { .. } => "pong",
            Self::Message { .. } => "message",
            Self::Typing { .. } => "typing",
            Self::UserJoined { .. } => "user_joined",
            Self::UserDisconnected { .. } => "user_disconnected",
            Self::Error { .. } => "error",
        }
    }
}

impl From<&ProtocolError> for ServerMessage {
    fn from(err: &ProtocolError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

impl From<&RateLimitError> for ServerMessage {
    fn from(err: &RateLimitError) -> Self {
        Self::Error {
            message: format!(
                "Rate limit exceeded: at most {} messages per window",
                err.limit
            ),
            code: Some("RATE_LIMITED".to_string()),
            reset_at: Some(err.reset_at),
        }
    }
}

impl From<&QuotaError> for ServerMessage {
    fn from(err: &QuotaError) -> Self {
        Self::error("QUOTA_EXCEEDED", err.to_string())
    }
}

/// A frame queued for a connection's writer task.
///
/// Broadcasts serialize once and share the text across recipients.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Raw(ServerMessage),
    Preserialized(Arc<str>),
}

impl OutboundMessage {
    pub fn preserialized(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(message)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Raw(message) => serde_json::to_string(message),
            Self::Preserialized(json) => Ok(json.to_string()),
        }
    }
}
