use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::ConnectionRegistry;

/// Background task that closes connections with no inbound activity.
///
/// The sweeper only asks a connection to close; the connection's own task
/// then runs the normal close sequence, so the room still hears
/// `user_disconnected` exactly once.
pub struct StaleConnectionSweeper {
    config: WebSocketConfig,
    registry: Arc<ConnectionRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl StaleConnectionSweeper {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<ConnectionRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires
    pub async fn run(mut self) {
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        cleanup_timer.tick().await;

        tracing::info!(
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = self.config.connection_timeout,
            "Stale connection sweeper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Stale connection sweeper received shutdown signal");
                    break;
                }
                _ = cleanup_timer.tick() => {
                    self.sweep();
                }
            }
        }

        tracing::info!("Stale connection sweeper stopped");
    }

    /// Ask every idle connection to close. Returns how many were asked.
    pub fn sweep(&self) -> usize {
        let timeout_secs = self.config.connection_timeout;
        let stale = self.registry.stale_connections(timeout_secs);

        for handle in &stale {
            tracing::info!(
                connection_id = %handle.id,
                principal_id = %handle.principal_id,
                room_id = %handle.room_id,
                "Closing stale connection due to timeout"
            );
            handle.request_close();
        }

        if !stale.is_empty() {
            tracing::info!(
                closed = stale.len(),
                timeout_secs = timeout_secs,
                "Swept stale connections"
            );
        }

        stale.len()
    }
}
