use std::sync::Arc;
use std::time::Duration;

use super::validator::{AuthError, TokenValidator};

/// Turns a bearer token into a principal ID, or refuses.
///
/// Fails closed: a validator that errors, times out, answers `valid: false`,
/// or omits the principal never admits the caller.
#[derive(Clone)]
pub struct AuthGate {
    validator: Arc<dyn TokenValidator>,
    timeout: Duration,
}

impl AuthGate {
    pub fn new(validator: Arc<dyn TokenValidator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }

    /// Name of the backend behind this gate
    pub fn validator_name(&self) -> &'static str {
        self.validator.name()
    }

    pub async fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let validation = match tokio::time::timeout(self.timeout, self.validator.validate(token))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    backend = self.validator.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Token validation timed out"
                );
                return Err(AuthError::Timeout(self.timeout));
            }
        };

        if !validation.valid {
            return Err(AuthError::Rejected(
                validation
                    .error
                    .unwrap_or_else(|| "token not accepted".to_string()),
            ));
        }

        match validation.principal_id {
            Some(principal_id) if !principal_id.trim().is_empty() => Ok(principal_id),
            _ => Err(AuthError::Rejected(
                "validator did not return a principal".to_string(),
            )),
        }
    }
}
