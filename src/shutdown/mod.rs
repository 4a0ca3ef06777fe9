//! Graceful shutdown handling for the relay.
//!
//! Sessions are not persisted, so shutdown only has to close every live
//! connection and give the socket tasks a moment to send their close frames.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::ShutdownSettings;
use crate::connection_manager::SessionRegistry;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for sockets to finish closing
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ShutdownSettings> for ShutdownConfig {
    fn from(settings: &ShutdownSettings) -> Self {
        Self {
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        }
    }
}

/// Closes all connections tracked by the registry
pub struct GracefulShutdown {
    registry: Arc<SessionRegistry>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(registry: Arc<SessionRegistry>, config: ShutdownConfig) -> Self {
        Self { registry, config }
    }

    /// Execute graceful shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.registry.connection_count())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();

        tracing::info!(reason = %reason, "Closing client connections");
        let connections_closed = self.registry.close_all();

        let drained = self.wait_for_teardown().await;
        let remaining = self.registry.connection_count();

        let result = ShutdownResult {
            connections_closed,
            remaining_connections: remaining,
            drained,
            duration: start.elapsed(),
        };

        tracing::info!(
            connections_closed = result.connections_closed,
            remaining_connections = result.remaining_connections,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    /// Wait for socket tasks to remove their connections from the registry
    async fn wait_for_teardown(&self) -> bool {
        let wait = async {
            while self.registry.connection_count() > 0 {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        match timeout(self.config.drain_timeout, wait).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    remaining_connections = self.registry.connection_count(),
                    "Some connections did not close gracefully"
                );
                false
            }
        }
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Connections that were open when shutdown began
    pub connections_closed: usize,
    /// Connections still tracked after the drain timeout
    pub remaining_connections: usize,
    /// Whether every connection finished tearing down in time
    pub drained: bool,
    pub duration: Duration,
}
