use async_trait::async_trait;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

use super::validator::{AuthError, TokenValidation, TokenValidator};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Verifies HS256 tokens locally instead of calling out to a service.
pub struct JwtTokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenValidator {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AuthError::Misconfigured("auth.jwt_secret is required for the jwt backend".into())
            })?;

        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.jwt_audience {
            validation.set_audience(&[audience]);
        }

        Ok(Self {
            decoding_key,
            validation,
        })
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenValidation, AuthError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(TokenValidation::accepted(data.claims.sub)),
            Err(e) => Ok(TokenValidation::rejected(e.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "jwt"
    }
}
