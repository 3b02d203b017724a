//! Rate limiting configuration

use serde::Deserialize;

/// Length of one counting window
pub const DEFAULT_WINDOW_MS: u64 = 60_000;

/// Configuration for per-principal frame rate limiting
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Chargeable frames a principal may send per window
    #[serde(default = "default_max_messages_per_window")]
    pub max_messages_per_window: u32,
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_messages_per_window() -> u32 {
    60
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_messages_per_window: default_max_messages_per_window(),
            window_ms: default_window_ms(),
        }
    }
}
