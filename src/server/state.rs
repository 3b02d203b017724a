use std::sync::Arc;
use std::time::Duration;

use crate::auth::{create_auth_gate, AuthGate};
use crate::config::Settings;
use crate::connection_manager::{ConnectionLimits, ConnectionRegistry};
use crate::error::AppError;
use crate::ratelimit::RateLimiter;
use crate::websocket::MessageRouter;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub auth_gate: AuthGate,
    pub registry: Arc<ConnectionRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub router: Arc<MessageRouter>,
}

impl AppState {
    /// Build state with the token validator selected in `settings.auth`
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let auth_gate = create_auth_gate(&settings.auth)?;
        Ok(Self::with_auth_gate(settings, auth_gate))
    }

    pub fn with_auth_gate(settings: Settings, auth_gate: AuthGate) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(settings.ratelimit.clone()));
        let limits = ConnectionLimits {
            max_connections_per_principal: settings.limits.max_connections_per_user,
            max_connections_per_room: settings.limits.max_connections_per_room,
        };
        let registry = Arc::new(ConnectionRegistry::new(limits, rate_limiter.clone()));
        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            Duration::from_millis(settings.websocket.send_timeout_ms),
        ));

        Self {
            settings: Arc::new(settings),
            auth_gate,
            registry,
            rate_limiter,
            router,
        }
    }
}
