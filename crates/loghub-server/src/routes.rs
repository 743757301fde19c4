//! Route configuration for the gateway API.

use std::sync::Arc;

use axum::routing::{get, post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handlers::{banner, health_check, search};
use crate::state::GatewayState;

/// Create the gateway router.
pub fn create_router(state: Arc<GatewayState>) -> Router {
    let cors = build_cors_layer(state.config());

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
        .route("/search", post(search))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
