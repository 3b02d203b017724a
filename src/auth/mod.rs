//! Connection authentication.
//!
//! The [`AuthGate`] wraps a pluggable [`TokenValidator`] with a bounded
//! timeout and fail-closed interpretation of its answers.

mod gate;
mod http;
mod jwt;
mod validator;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AuthBackend, AuthConfig};

pub use gate::AuthGate;
pub use http::HttpTokenValidator;
pub use jwt::{Claims, JwtTokenValidator};
pub use validator::{AuthError, TokenValidation, TokenValidator};

/// Build the validator selected by `auth.backend`
pub fn create_token_validator(config: &AuthConfig) -> Result<Arc<dyn TokenValidator>, AuthError> {
    let validator: Arc<dyn TokenValidator> = match config.backend {
        AuthBackend::Http => {
            tracing::info!(url = %config.validator_url, "Using HTTP token validator");
            Arc::new(HttpTokenValidator::new(
                config.validator_url.clone(),
                Duration::from_millis(config.timeout_ms),
            )?)
        }
        AuthBackend::Jwt => {
            tracing::info!("Using local JWT token validator");
            Arc::new(JwtTokenValidator::new(config)?)
        }
    };
    Ok(validator)
}

/// Build the gate for the configured backend and timeout
pub fn create_auth_gate(config: &AuthConfig) -> Result<AuthGate, AuthError> {
    let validator = create_token_validator(config)?;
    Ok(AuthGate::new(
        validator,
        Duration::from_millis(config.timeout_ms),
    ))
}
