use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

pub use crate::ratelimit::RateLimitConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub ratelimit: RateLimitConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Which token validation backend admits connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthBackend {
    /// Remote validation service reached over HTTP
    Http,
    /// Local HS256 verification
    Jwt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_backend")]
    pub backend: AuthBackend,
    /// Endpoint of the token validation service
    #[serde(default = "default_validator_url")]
    pub validator_url: String,
    /// Upper bound for a single validation call, in milliseconds
    #[serde(default = "default_auth_timeout_ms")]
    pub timeout_ms: u64,
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
    #[serde(default = "default_max_connections_per_room")]
    pub max_connections_per_room: usize,
    /// Maximum size of a `message` frame's content, in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Capacity of each connection's outbound queue
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// How long a broadcast waits on a full peer queue before giving up
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Connection timeout in seconds (disconnect if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_auth_backend() -> AuthBackend {
    AuthBackend::Http
}

fn default_validator_url() -> String {
    "http://localhost:3000/api/auth/validate".to_string()
}

fn default_auth_timeout_ms() -> u64 {
    5000
}

fn default_max_connections_per_user() -> usize {
    5
}

fn default_max_connections_per_room() -> usize {
    20
}

fn default_max_message_bytes() -> usize {
    10 * 1024
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_connection_timeout() -> u64 {
    300 // 5 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", 8082)?
            .set_default("auth.backend", "http")?
            .set_default("auth.validator_url", default_validator_url())?
            .set_default("auth.timeout_ms", 5000)?
            .set_default("limits.max_connections_per_user", 5)?
            .set_default("limits.max_connections_per_room", 20)?
            .set_default("limits.max_message_bytes", 10 * 1024)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, AUTH__VALIDATOR_URL, LIMITS__MAX_CONNECTIONS_PER_USER, ...
            // Only list-typed keys are split on commas
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            ratelimit: RateLimitConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend: default_auth_backend(),
            validator_url: default_validator_url(),
            timeout_ms: default_auth_timeout_ms(),
            jwt_secret: None,
            jwt_issuer: None,
            jwt_audience: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: default_max_connections_per_user(),
            max_connections_per_room: default_max_connections_per_room(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8082);

        let limits = LimitsConfig::default();
        assert_eq!(limits.max_connections_per_user, 5);
        assert_eq!(limits.max_connections_per_room, 20);
        assert_eq!(limits.max_message_bytes, 10_240);
    }

    #[test]
    fn test_env_overrides() {
        // The only test in this binary that touches these variables
        let vars = [
            ("AUTH__VALIDATOR_URL", "http://validator.internal/check"),
            ("AUTH__BACKEND", "jwt"),
            ("LIMITS__MAX_CONNECTIONS_PER_USER", "7"),
            ("RATELIMIT__WINDOW_MS", "30000"),
            ("SERVER__CORS_ORIGINS", "http://a.example,http://b.example"),
        ];
        for (key, value) in vars {
            env::set_var(key, value);
        }

        let settings = Settings::new();

        for (key, _) in vars {
            env::remove_var(key);
        }

        let settings = settings.unwrap();
        assert_eq!(settings.auth.validator_url, "http://validator.internal/check");
        assert_eq!(settings.auth.backend, AuthBackend::Jwt);
        assert_eq!(settings.limits.max_connections_per_user, 7);
        assert_eq!(settings.limits.max_connections_per_room, 20);
        assert_eq!(settings.ratelimit.window_ms, 30_000);
        assert_eq!(
            settings.server.cors_origins,
            vec!["http://a.example".to_string(), "http://b.example".to_string()]
        );
    }

    #[test]
    fn test_auth_backend_parsing() {
        let backend: AuthBackend = serde_json::from_str("\"jwt\"").unwrap();
        assert_eq!(backend, AuthBackend::Jwt);
        assert_eq!(AuthConfig::default().backend, AuthBackend::Http);
        assert_eq!(AuthConfig::default().timeout_ms, 5000);
    }
}
