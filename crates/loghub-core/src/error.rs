//! Error types for backend searches.

use std::time::Duration;

use thiserror::Error;

/// Errors a single backend can raise while serving one search.
///
/// None of these abort an aggregate search: the aggregator logs them and
/// moves on to the next backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request to the backend could not be sent or completed.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with something we could not use.
    #[error("unexpected response: {0}")]
    Response(String),

    /// The backend did not answer within its deadline.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The surrounding request was cancelled.
    #[error("search cancelled")]
    Cancelled,

    /// The backend ran the query but reported a terminal failure state.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Returns true for errors caused by the deadline rather than the backend.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
