use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Answer from a token validation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub principal_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TokenValidation {
    pub fn accepted(principal_id: impl Into<String>) -> Self {
        Self {
            valid: true,
            principal_id: Some(principal_id.into()),
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            principal_id: None,
            error: Some(reason.into()),
        }
    }
}

/// Why a connecting client could not be authenticated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    Rejected(String),

    #[error("Token validation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Token validation unavailable: {0}")]
    Unavailable(String),

    #[error("Token validation misconfigured: {0}")]
    Misconfigured(String),
}

/// Backend that decides whether a bearer token is valid
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate `token`. Transport-level failures are returned as errors;
    /// a reachable backend that dislikes the token returns `valid: false`.
    async fn validate(&self, token: &str) -> Result<TokenValidation, AuthError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}
