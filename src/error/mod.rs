use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::connection_manager::QuotaError;

/// Errors that end an HTTP request, including a refused WebSocket upgrade.
/// Every variant here is raised before any registry state exists.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Quota(#[from] QuotaError),

    #[error("WebSocket upgrade required")]
    UpgradeRequired,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<usize>,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingParameter(_) => "MISSING_PARAMETER",
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::Quota(_) => "QUOTA_EXCEEDED",
            AppError::UpgradeRequired => "UPGRADE_REQUIRED",
        }
    }

    /// Label used for the admission rejection metric
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::MissingParameter(_) => "parameter",
            AppError::Auth(_) => "auth",
            AppError::Quota(_) => "quota",
            AppError::UpgradeRequired => "upgrade",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let log_message = self.to_string();

        let client_message = match &self {
            AppError::Auth(AuthError::Unavailable(_) | AuthError::Misconfigured(_))
                if is_production() =>
            {
                "Unable to verify token".to_string()
            }
            _ => log_message.clone(),
        };

        let (limit, max) = match &self {
            AppError::Quota(e) => (Some(e.limit()), Some(e.max())),
            _ => (None, None),
        };

        tracing::warn!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "Request rejected"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
                limit,
                max,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::MissingParameter("roomId").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Auth(AuthError::MissingToken).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::UpgradeRequired.status(),
            StatusCode::UPGRADE_REQUIRED
        );

        let quota = AppError::Quota(QuotaError::PrincipalLimitExceeded {
            principal_id: "user-1".into(),
            current: 5,
            max: 5,
        });
        assert_eq!(quota.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(quota.code(), "QUOTA_EXCEEDED");
        assert_eq!(quota.reason(), "quota");
    }
}
