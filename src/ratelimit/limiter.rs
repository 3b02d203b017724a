//! Per-principal frame rate limiter

use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use super::config::RateLimitConfig;
use super::fixed_window::{FixedWindow, WindowDecision};

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Frame is allowed
    Allowed {
        remaining: u32,
        limit: u32,
        reset_at: i64,
    },
    /// Frame is denied until `reset_at` (Unix milliseconds)
    Denied { limit: u32, reset_at: i64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    /// Convert into a `Result`, turning a denial into a [`RateLimitError`].
    pub fn into_result(self) -> Result<(), RateLimitError> {
        match self {
            RateLimitResult::Allowed { .. } => Ok(()),
            RateLimitResult::Denied { limit, reset_at } => {
                Err(RateLimitError { limit, reset_at })
            }
        }
    }
}

/// Raised when a principal has used up its frame budget for the current window
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Rate limit exceeded: {limit} messages per window, retry after {reset_at}")]
pub struct RateLimitError {
    pub limit: u32,
    pub reset_at: i64,
}

/// Fixed-window limiter keyed by principal.
///
/// Trackers are created lazily on the first chargeable frame and removed
/// through [`RateLimiter::remove`] once the principal has no live
/// connections, so memory stays bounded by the set of active principals.
pub struct RateLimiter {
    trackers: DashMap<String, FixedWindow>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with the given configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            trackers: DashMap::new(),
            config,
        }
    }

    /// Check if rate limiting is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Charge one frame for `principal_id` against the wall clock.
    pub fn check(&self, principal_id: &str) -> RateLimitResult {
        self.check_at(principal_id, FixedWindow::now_millis())
    }

    /// Charge one frame for `principal_id` as if the current time were `now_ms`.
    pub fn check_at(&self, principal_id: &str, now_ms: i64) -> RateLimitResult {
        let limit = self.config.max_messages_per_window;

        if !self.config.enabled {
            return RateLimitResult::Allowed {
                remaining: u32::MAX,
                limit,
                reset_at: 0,
            };
        }

        let window_ms = self.config.window_ms;

        // The entry guard holds the shard lock, so reset/increment is atomic
        // for a given principal.
        let mut entry = self
            .trackers
            .entry(principal_id.to_string())
            .or_insert_with(|| FixedWindow::new(now_ms, window_ms));

        match entry.charge(now_ms, limit, window_ms) {
            WindowDecision::Allowed {
                remaining,
                reset_at,
            } => RateLimitResult::Allowed {
                remaining,
                limit,
                reset_at,
            },
            WindowDecision::Denied { reset_at } => {
                tracing::debug!(
                    principal_id = %principal_id,
                    limit = limit,
                    reset_at = reset_at,
                    "Frame rate limit exceeded"
                );
                RateLimitResult::Denied { limit, reset_at }
            }
        }
    }

    /// Drop the tracker for a principal. Returns whether one existed.
    pub fn remove(&self, principal_id: &str) -> bool {
        let removed = self.trackers.remove(principal_id).is_some();
        if removed {
            tracing::debug!(principal_id = %principal_id, "Removed rate limit tracker");
        }
        removed
    }

    /// Frames charged so far in the principal's current window
    pub fn current_count(&self, principal_id: &str) -> u32 {
        self.trackers
            .get(principal_id)
            .map(|w| w.count())
            .unwrap_or(0)
    }

    /// Get statistics about the rate limiter
    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            enabled: self.config.enabled,
            trackers: self.trackers.len(),
            limit: self.config.max_messages_per_window,
            window_ms: self.config.window_ms,
        }
    }
}

/// Statistics about the rate limiter
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub trackers: usize,
    pub limit: u32,
    pub window_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(cap: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            max_messages_per_window: cap,
            window_ms: 60_000,
        })
    }

    #[test]
    fn test_rate_limiter_disabled() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            ..Default::default()
        });

        for _ in 0..500 {
            assert!(limiter.check("user-1").is_allowed());
        }
        assert_eq!(limiter.stats().trackers, 0);
    }

    #[test]
    fn test_sixty_first_frame_denied_until_reset() {
        let limiter = limiter(60);
        let start = 1_000_000;

        for i in 0..60 {
            assert!(limiter.check_at("user-1", start + i).is_allowed());
        }

        let denied = limiter.check_at("user-1", start + 500);
        let err = denied.clone().into_result().unwrap_err();
        assert_eq!(err.limit, 60);
        assert_eq!(err.reset_at, start + 60_000);
        assert!(err.reset_at > start + 500);

        // Once reset_at has passed a fresh window opens
        assert!(limiter.check_at("user-1", err.reset_at + 1).is_allowed());
        assert_eq!(limiter.current_count("user-1"), 1);
    }

    #[test]
    fn test_principals_have_independent_budgets() {
        let limiter = limiter(3);

        for _ in 0..3 {
            assert!(limiter.check_at("user-1", 10).is_allowed());
        }
        assert!(!limiter.check_at("user-1", 10).is_allowed());

        for _ in 0..3 {
            assert!(limiter.check_at("user-2", 10).is_allowed());
        }
        assert!(!limiter.check_at("user-2", 10).is_allowed());
    }

    #[test]
    fn test_boundary_burst_is_bounded_by_two_windows() {
        let limiter = limiter(5);
        // Opens the window [0, 60_000]
        assert!(limiter.check_at("user-1", 0).is_allowed());
        let mut accepted = 1;

        // Hammer the limiter on both sides of the window boundary
        for t in [59_999_i64, 60_000, 60_001, 60_002] {
            for _ in 0..10 {
                if limiter.check_at("user-1", t).is_allowed() {
                    accepted += 1;
                }
            }
        }

        assert_eq!(accepted, 10);
    }

    #[test]
    fn test_remove_clears_tracker() {
        let limiter = limiter(2);
        limiter.check_at("user-1", 0);
        limiter.check_at("user-1", 0);
        assert!(!limiter.check_at("user-1", 0).is_allowed());

        assert!(limiter.remove("user-1"));
        assert!(!limiter.remove("user-1"));
        assert_eq!(limiter.current_count("user-1"), 0);
        assert!(limiter.check_at("user-1", 0).is_allowed());
    }

    #[test]
    fn test_stats() {
        let limiter = limiter(60);
        limiter.check("user-1");
        limiter.check("user-2");

        let stats = limiter.stats();
        assert!(stats.enabled);
        assert_eq!(stats.trackers, 2);
        assert_eq!(stats.limit, 60);
        assert_eq!(stats.window_ms, 60_000);
    }
}
