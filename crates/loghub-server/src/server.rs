//! Gateway server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use loghub_core::SharedBackend;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::routes::create_router;
use crate::state::GatewayState;

/// The log search gateway.
///
/// Serves `POST /search` over the current backend snapshot. The snapshot can
/// be replaced while the server runs; searches already in flight finish on
/// the snapshot they started with.
#[derive(Debug, Clone)]
pub struct GatewayServer {
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Create a new gateway serving `backends`.
    #[must_use]
    pub fn new(config: ServerConfig, backends: Vec<SharedBackend>) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config, backends)),
        }
    }

    /// Get the gateway state for external access.
    #[must_use]
    pub fn state(&self) -> Arc<GatewayState> {
        Arc::clone(&self.state)
    }

    /// Install a new backend list and return its generation.
    pub fn replace_backends(&self, backends: Vec<SharedBackend>) -> u64 {
        self.state.registry().replace(backends)
    }

    /// Start the server on the configured address and run until a fatal
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve(&self) -> GatewayResult<()> {
        let addr = self.state.config().bind_addr;
        let listener = bind(addr).await?;

        axum::serve(listener, self.router())
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Start the server with graceful shutdown support.
    ///
    /// When `shutdown` completes, running searches are cancelled (they answer
    /// with what they gathered so far) and the server stops accepting
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> GatewayResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config().bind_addr;
        let listener = bind(addr).await?;

        let token = self.state.shutdown_token().clone();
        let signal = async move {
            shutdown.await;
            token.cancel();
        };

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        info!("Gateway server shut down");
        Ok(())
    }

    /// Create the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }
}

async fn bind(addr: SocketAddr) -> GatewayResult<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::BindFailed(addr, e))?;
    info!(addr = %addr, "Gateway server listening");
    Ok(listener)
}
