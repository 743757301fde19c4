//! Shared state for the gateway server.

use std::sync::Arc;
use std::time::Instant;

use loghub_core::{Aggregator, BackendRegistry, SharedBackend};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

/// Shared state for the gateway server.
#[derive(Debug)]
pub struct GatewayState {
    /// Server configuration.
    config: Arc<ServerConfig>,
    /// The live backend list.
    registry: BackendRegistry,
    /// Runs searches over a snapshot of the registry.
    aggregator: Aggregator,
    /// Cancelled when the server shuts down.
    shutdown: CancellationToken,
    /// Server start time.
    start_time: Instant,
}

impl GatewayState {
    /// Create a new gateway state serving `backends`.
    pub fn new(config: ServerConfig, backends: Vec<SharedBackend>) -> Self {
        let aggregator = Aggregator::with_default_timeout(config.default_backend_timeout);
        Self {
            config: Arc::new(config),
            registry: BackendRegistry::new(backends),
            aggregator,
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the backend registry.
    #[must_use]
    pub const fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Get the aggregator.
    #[must_use]
    pub const fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// A token that is cancelled with the server; each search runs under a
    /// child of it.
    #[must_use]
    pub const fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loghub_core::testing::StaticBackend;
    use std::time::Duration;

    #[test]
    fn test_state_wires_config_into_aggregator() {
        let config = ServerConfig::default().with_default_backend_timeout(Duration::from_secs(3));
        let state = GatewayState::new(config, vec![Arc::new(StaticBackend::new("a"))]);

        assert_eq!(state.aggregator().config().default_timeout, Duration::from_secs(3));
        assert_eq!(state.registry().snapshot().len(), 1);
        assert_eq!(state.registry().generation(), 1);
        assert!(!state.shutdown_token().is_cancelled());
    }
}
