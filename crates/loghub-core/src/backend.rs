//! The backend contract.
//!
//! Every log store the gateway can query implements [`LogBackend`]. The trait
//! is object safe so the aggregator can hold a heterogeneous list of
//! backends behind `Arc<dyn LogBackend>`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::params::{Labels, SearchParams};
use crate::route::{RouteMatch, RouteSet};
use crate::types::SearchResults;

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// A backend shared between the registry and in-flight searches.
pub type SharedBackend = Arc<dyn LogBackend>;

/// The kinds of log store the gateway knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Elasticsearch `_search` API.
    Elasticsearch,
    /// OpenSearch `_search` API.
    #[serde(rename = "opensearch")]
    OpenSearch,
    /// AWS CloudWatch Logs Insights.
    #[serde(rename = "cloudwatch")]
    CloudWatch,
    /// Kubernetes pod logs.
    Kubernetes,
    /// Local files.
    File,
}

impl BackendKind {
    /// The configuration key for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Elasticsearch => "elasticsearch",
            Self::OpenSearch => "opensearch",
            Self::CloudWatch => "cloudwatch",
            Self::Kubernetes => "kubernetes",
            Self::File => "file",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings every backend entry carries regardless of kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonBackend {
    /// Display name used in logs and reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Routes deciding which queries this backend answers.
    pub routes: RouteSet,
    /// Static labels attached to every result.
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// Per-backend deadline in seconds; overrides the gateway default.
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl CommonBackend {
    /// Creates settings with the given routes.
    #[must_use]
    pub fn with_routes(routes: impl Into<RouteSet>) -> Self {
        Self {
            routes: routes.into(),
            ..Self::default()
        }
    }

    /// The configured name, or `<kind>-<index>` when none was given.
    #[must_use]
    pub fn resolved_name(&self, kind: BackendKind, index: usize) -> String {
        self.name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("{kind}-{index}"))
    }

    /// The configured deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// A log store that can answer searches.
pub trait LogBackend: Send + Sync {
    /// Display name of this backend instance.
    fn name(&self) -> &str;

    /// Kind of store behind this backend.
    fn kind(&self) -> BackendKind;

    /// The routes deciding which queries this backend answers.
    fn routes(&self) -> &RouteSet;

    /// Per-backend deadline overriding the aggregator default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Decides whether this backend answers `params`.
    fn match_route(&self, params: &SearchParams) -> RouteMatch {
        self.routes().match_params(params)
    }

    /// Runs one search.
    ///
    /// `params` have already been resolved; implementations read defaults
    /// and time bounds from it directly.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be reached or its answer
    /// cannot be interpreted.
    fn search<'a>(&'a self, params: &'a SearchParams) -> BackendFuture<'a, SearchResults>;

    /// Checks that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error when the store does not answer as expected.
    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

impl fmt::Debug for dyn LogBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogBackend")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("routes", &self.routes().len())
            .finish()
    }
}
