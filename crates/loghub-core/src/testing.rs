//! In-memory backend for tests.
//!
//! Available with the `test-util` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{BackendFuture, BackendKind, LogBackend};
use crate::error::BackendError;
use crate::params::SearchParams;
use crate::route::{RouteSet, SearchRoute};
use crate::types::{SearchResult, SearchResults};

#[derive(Debug, Clone)]
enum Response {
    Results(SearchResults),
    Failure(String),
}

/// A backend that answers every search with a canned response.
#[derive(Debug)]
pub struct StaticBackend {
    name: String,
    routes: RouteSet,
    timeout: Option<Duration>,
    delay: Option<Duration>,
    response: Response,
    ping_failure: Option<String>,
    calls: AtomicUsize,
    last_params: Mutex<Option<SearchParams>>,
}

impl StaticBackend {
    /// Creates a backend that matches every query and returns no results.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: RouteSet::new(vec![SearchRoute::new()]),
            timeout: None,
            delay: None,
            response: Response::Results(SearchResults::default()),
            ping_failure: None,
            calls: AtomicUsize::new(0),
            last_params: Mutex::new(None),
        }
    }

    /// Replaces the routes.
    #[must_use]
    pub fn with_routes(mut self, routes: impl Into<RouteSet>) -> Self {
        self.routes = routes.into();
        self
    }

    /// Sets the per-backend deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delays every answer.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answers with `results`.
    #[must_use]
    pub fn returning(mut self, results: SearchResults) -> Self {
        self.response = Response::Results(results);
        self
    }

    /// Answers with one result per message.
    #[must_use]
    pub fn returning_messages(self, messages: &[&str]) -> Self {
        let results = messages.iter().map(|m| SearchResult::new(*m)).collect();
        self.returning(SearchResults::from_results(results))
    }

    /// Fails every search with `message`.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.response = Response::Failure(message.into());
        self
    }

    /// Fails every ping with `message`.
    #[must_use]
    pub fn failing_ping(mut self, message: impl Into<String>) -> Self {
        self.ping_failure = Some(message.into());
        self
    }

    /// Number of searches served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The params of the most recent search.
    #[must_use]
    pub fn last_params(&self) -> Option<SearchParams> {
        self.last_params.lock().clone()
    }
}

impl LogBackend for StaticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn routes(&self) -> &RouteSet {
        &self.routes
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn search<'a>(&'a self, params: &'a SearchParams) -> BackendFuture<'a, SearchResults> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_params.lock() = Some(params.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.response {
                Response::Results(results) => Ok(results.clone()),
                Response::Failure(message) => Err(BackendError::Request(message.clone())),
            }
        })
    }

    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.ping_failure {
                Some(message) => Err(BackendError::Request(message.clone())),
                None => Ok(()),
            }
        })
    }
}
