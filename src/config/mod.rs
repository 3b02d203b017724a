mod settings;

pub use settings::{
    AuthBackend, AuthConfig, LimitsConfig, RateLimitConfig, ServerConfig, Settings,
    WebSocketConfig,
};
