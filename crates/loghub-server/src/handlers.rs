//! HTTP request handlers for the gateway API.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use loghub_core::{SearchParams, SearchReport};
use serde::Serialize;
use tracing::debug;

use crate::error::GatewayResult;
use crate::state::GatewayState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Status message.
    pub status: String,
    /// Number of backends in the current snapshot.
    pub backends: usize,
    /// Generation of the current snapshot.
    pub generation: u64,
    /// When the current snapshot was installed.
    pub loaded_at: DateTime<Utc>,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Handle GET / - plain-text banner.
pub async fn banner() -> &'static str {
    concat!("loghub ", env!("CARGO_PKG_VERSION"), "\n")
}

/// Handle GET /health - health check endpoint.
pub async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let snapshot = state.registry().snapshot();
    Json(HealthResponse {
        status: "ok".to_string(),
        backends: snapshot.len(),
        generation: snapshot.generation(),
        loaded_at: snapshot.loaded_at(),
        uptime_secs: state.uptime_secs(),
    })
}

/// Handle POST /search - run one search across the current backends.
///
/// Always answers 200 once the body parses; per-backend failures are
/// reported in the `backends` list.
pub async fn search(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<SearchParams>, JsonRejection>,
) -> GatewayResult<Json<SearchReport>> {
    let Json(params) = payload?;
    debug!(%params, "search requested");

    let snapshot = state.registry().snapshot();
    let cancel = state.shutdown_token().child_token();
    let report = state
        .aggregator()
        .search_with_report(snapshot.backends(), params, &cancel)
        .await;

    Ok(Json(report))
}
