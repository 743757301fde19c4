//! # loghub-core
//!
//! Query model, route matching and result aggregation for the loghub log
//! search gateway.
//!
//! This crate provides:
//!
//! - [`SearchParams`]: a normalized search request with defaulting and time parsing
//! - [`SearchRoute`] / [`RouteSet`]: rules deciding which backend answers a query
//! - [`LogBackend`]: the contract every log store adapter implements
//! - [`Aggregator`]: sequential fan-out with additive early exit
//! - [`BackendRegistry`]: the live, swappable backend list
//!
//! ## Example
//!
//! ```rust
//! use loghub_core::{RouteSet, SearchParams, SearchRoute};
//!
//! let routes = RouteSet::new(vec![
//!     SearchRoute::new()
//!         .with_type("KubernetesPod")
//!         .with_label("app", "web,api"),
//! ]);
//!
//! let params = SearchParams::new()
//!     .with_type("KubernetesPod")
//!     .with_label("app", "api")
//!     .resolve();
//!
//! assert!(routes.match_params(&params).matched);
//! assert_eq!(params.limit, 50);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod backend;
pub mod error;
pub mod params;
pub mod registry;
pub mod route;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod types;

pub use aggregator::{
    Aggregator, AggregatorConfig, BackendOutcome, OutcomeStatus, SearchReport,
    DEFAULT_BACKEND_TIMEOUT,
};
pub use backend::{BackendFuture, BackendKind, CommonBackend, LogBackend, SharedBackend};
pub use error::{BackendError, Result};
pub use params::{parse_age, parse_time_expr, Labels, SearchParams};
pub use registry::{BackendRegistry, BackendSnapshot};
pub use route::{match_backend, RouteMatch, RouteSet, SearchRoute};
pub use types::{merge_labels, SearchResult, SearchResults};
