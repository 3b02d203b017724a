use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::validator::{AuthError, TokenValidation, TokenValidator};

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

/// Validates tokens against the external validation service over HTTP.
pub struct HttpTokenValidator {
    client: Client,
    url: String,
}

impl HttpTokenValidator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| AuthError::Misconfigured(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TokenValidator for HttpTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenValidation, AuthError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ValidateRequest { token })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Unavailable("validator request timed out".to_string())
                } else {
                    AuthError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!(
                "validator responded with {}",
                status
            )));
        }

        response
            .json::<TokenValidation>()
            .await
            .map_err(|e| AuthError::Unavailable(format!("malformed validator response: {}", e)))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
