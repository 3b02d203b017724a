//! Graceful shutdown for live room connections.
//!
//! On shutdown every open connection is asked to close. Each connection then
//! runs its own close sequence, so rooms still see `user_disconnected` for
//! peers that go away before the process exits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::connection_manager::ConnectionRegistry;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for connections to finish closing (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// Closes every registered connection and waits for the registry to drain
pub struct GracefulShutdown {
    registry: Arc<ConnectionRegistry>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self::with_config(registry, ShutdownConfig::default())
    }

    pub fn with_config(registry: Arc<ConnectionRegistry>, config: ShutdownConfig) -> Self {
        Self { registry, config }
    }

    /// Request close on all connections, then wait up to `drain_timeout`
    pub async fn execute(&self) -> ShutdownResult {
        let start = Instant::now();
        let connections = self.registry.all_connections();
        let initial = connections.len();

        tracing::info!(total_connections = initial, "Starting graceful shutdown");

        for handle in &connections {
            handle.request_close();
        }

        let drained = self.wait_for_connections_to_close().await;
        let remaining = self.registry.stats().total_connections;

        let result = ShutdownResult {
            success: drained,
            connections_closed: initial.saturating_sub(remaining),
            remaining_connections: remaining,
            duration: start.elapsed(),
        };

        if result.success {
            tracing::info!(
                connections_closed = result.connections_closed,
                duration_ms = result.duration.as_millis() as u64,
                "Graceful shutdown completed"
            );
        } else {
            tracing::warn!(
                remaining_connections = result.remaining_connections,
                "Some connections did not close gracefully"
            );
        }

        result
    }

    async fn wait_for_connections_to_close(&self) -> bool {
        if self.registry.stats().total_connections == 0 {
            return true;
        }

        let wait_future = async {
            loop {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if self.registry.stats().total_connections == 0 {
                    break;
                }
            }
        };

        timeout(self.config.drain_timeout, wait_future).await.is_ok()
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Clone)]
pub struct ShutdownResult {
    /// Whether every connection closed before the drain timeout
    pub success: bool,
    pub connections_closed: usize,
    pub remaining_connections: usize,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::ConnectionLimits;
    use crate::ratelimit::{RateLimitConfig, RateLimiter};
    use tokio::sync::mpsc;

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(
            ConnectionLimits::default(),
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
        ))
    }

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let shutdown = GracefulShutdown::new(registry());
        let result = shutdown.execute().await;

        assert!(result.success);
        assert_eq!(result.connections_closed, 0);
        assert_eq!(result.remaining_connections, 0);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_connections() {
        let registry = registry();
        let (tx, _rx) = mpsc::channel(4);
        let handle = registry
            .register("ticket-1".into(), "user-1".into(), tx)
            .unwrap();

        // Stand-in for the connection task: unregister once asked to close
        let closer = {
            let registry = registry.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                handle.close_requested().await;
                registry.unregister(handle.id);
            })
        };

        let result = GracefulShutdown::new(registry).execute().await;
        closer.await.unwrap();

        assert!(result.success);
        assert_eq!(result.connections_closed, 1);
    }

    #[tokio::test]
    async fn test_shutdown_times_out() {
        let registry = registry();
        let (tx, _rx) = mpsc::channel(4);
        registry
            .register("ticket-1".into(), "user-1".into(), tx)
            .unwrap();

        let shutdown = GracefulShutdown::with_config(
            registry,
            ShutdownConfig {
                drain_timeout: Duration::from_millis(100),
            },
        );
        let result = shutdown.execute().await;

        assert!(!result.success);
        assert_eq!(result.remaining_connections, 1);
    }
}
