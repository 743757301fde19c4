//! Sequential fan-out over the configured backends.
//!
//! This module provides:
//! - [`Aggregator`]: runs one search against an ordered backend list
//! - [`SearchReport`]: merged results plus one [`BackendOutcome`] per backend
//!
//! Backends are visited in configuration order. Each one whose routes accept
//! the query is searched under its deadline; failures are logged and
//! skipped. A match on an additive route discards whatever earlier backends
//! contributed and ends the iteration.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendKind, LogBackend, SharedBackend};
use crate::error::{BackendError, Result};
use crate::params::SearchParams;
use crate::types::SearchResults;

/// Deadline applied to a backend that does not configure its own.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Aggregator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Deadline for backends without their own timeout.
    pub default_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

/// What happened to one backend during a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// No route matched the query.
    Skipped,
    /// The backend answered.
    Ok,
    /// The backend returned an error.
    Failed,
    /// The backend missed its deadline.
    TimedOut,
    /// The request was cancelled while this backend was searching.
    Cancelled,
    /// The search ended before this backend was reached.
    NotRun,
}

/// Per-backend entry of a [`SearchReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendOutcome {
    /// Backend name.
    pub backend: String,
    /// Backend kind.
    pub kind: BackendKind,
    /// What happened.
    pub status: OutcomeStatus,
    /// Total reported by the backend.
    pub total: u64,
    /// Error message for failed or timed out backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time spent in the backend.
    pub elapsed_ms: u64,
}

impl BackendOutcome {
    fn new(backend: &dyn LogBackend, status: OutcomeStatus) -> Self {
        Self {
            backend: backend.name().to_string(),
            kind: backend.kind(),
            status,
            total: 0,
            error: None,
            elapsed_ms: 0,
        }
    }
}

/// Merged results of one search plus the per-backend report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReport {
    /// Correlation id of the search; also present in every log line.
    pub request_id: Uuid,
    /// The merged results.
    #[serde(flatten)]
    pub results: SearchResults,
    /// One entry per configured backend, in configuration order.
    pub backends: Vec<BackendOutcome>,
}

/// Accumulator over the backend list.
#[derive(Debug)]
enum Reduction {
    Accumulating(SearchResults),
    Finalized(SearchResults),
}

impl Reduction {
    const fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized(_))
    }

    fn absorb(self, page: SearchResults, additive: bool) -> Self {
        match self {
            // An additive match replaces everything gathered so far.
            Self::Accumulating(_) if additive => Self::Finalized(page),
            Self::Accumulating(acc) => Self::Accumulating(acc.merged(page)),
            finalized @ Self::Finalized(_) => finalized,
        }
    }

    fn into_results(self) -> SearchResults {
        match self {
            Self::Accumulating(results) | Self::Finalized(results) => results,
        }
    }
}

/// Runs searches across an ordered list of backends.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    /// Creates an aggregator.
    #[must_use]
    pub const fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Creates an aggregator with the given default backend deadline.
    #[must_use]
    pub const fn with_default_timeout(default_timeout: Duration) -> Self {
        Self::new(AggregatorConfig { default_timeout })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Searches `backends` and returns only the merged results.
    pub async fn search(&self, backends: &[SharedBackend], params: SearchParams) -> SearchResults {
        self.search_with_report(backends, params, &CancellationToken::new())
            .await
            .results
    }

    /// Searches `backends` and returns the merged results with a report.
    ///
    /// Cancelling `cancel` stops the iteration; results gathered so far are
    /// returned and the remaining backends are reported as not run.
    pub async fn search_with_report(
        &self,
        backends: &[SharedBackend],
        params: SearchParams,
        cancel: &CancellationToken,
    ) -> SearchReport {
        let params = params.resolve();
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let mut state = Reduction::Accumulating(SearchResults::default());
        let mut outcomes = Vec::with_capacity(backends.len());

        for (index, backend) in backends.iter().enumerate() {
            let backend = backend.as_ref();
            if state.is_finalized() || cancel.is_cancelled() {
                outcomes.push(BackendOutcome::new(backend, OutcomeStatus::NotRun));
                continue;
            }

            let route = backend.match_route(&params);
            if !route.matched {
                debug!(
                    %request_id,
                    index,
                    backend = backend.name(),
                    kind = %backend.kind(),
                    "no route matched, skipping backend"
                );
                outcomes.push(BackendOutcome::new(backend, OutcomeStatus::Skipped));
                continue;
            }

            let timeout = backend.timeout().unwrap_or(self.config.default_timeout);
            let call_started = Instant::now();
            let answer = run_backend(backend, &params, timeout, cancel).await;
            let mut outcome = BackendOutcome::new(backend, OutcomeStatus::Ok);
            outcome.elapsed_ms = millis(call_started.elapsed());

            match answer {
                Ok(page) => {
                    debug!(
                        %request_id,
                        index,
                        backend = backend.name(),
                        kind = %backend.kind(),
                        results = page.len(),
                        total = page.total,
                        additive = route.additive,
                        "backend answered"
                    );
                    outcome.total = page.total;
                    state = state.absorb(page, route.additive);
                }
                Err(err) => {
                    warn!(
                        %request_id,
                        index,
                        backend = backend.name(),
                        kind = %backend.kind(),
                        error = %err,
                        "backend search failed"
                    );
                    outcome.status = match err {
                        BackendError::Timeout(_) => OutcomeStatus::TimedOut,
                        BackendError::Cancelled => OutcomeStatus::Cancelled,
                        _ => OutcomeStatus::Failed,
                    };
                    outcome.error = Some(err.to_string());
                }
            }
            outcomes.push(outcome);
        }

        let results = state.into_results();
        info!(
            %request_id,
            query = %params,
            results = results.len(),
            total = results.total,
            elapsed_ms = millis(started.elapsed()),
            "search completed"
        );

        SearchReport {
            request_id,
            results,
            backends: outcomes,
        }
    }
}

async fn run_backend(
    backend: &dyn LogBackend,
    params: &SearchParams,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<SearchResults> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BackendError::Cancelled),
        answer = tokio::time::timeout(timeout, backend.search(params)) => {
            answer.unwrap_or(Err(BackendError::Timeout(timeout)))
        }
    }
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
