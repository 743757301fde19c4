//! Route matching.
//!
//! This module provides:
//! - [`SearchRoute`]: one rule deciding whether a backend serves a query
//! - [`RouteSet`]: the ordered routes of a backend
//! - [`RouteMatch`]: the `(matched, additive)` decision
//!
//! A route matches when its type equals the query type ignoring case (if
//! set), the query id starts with its prefix (if set), and every route label
//! is satisfied by the query labels. Route label values are comma-separated alternatives; `*`
//! matches any present value and a leading `!` negates an alternative.

use serde::{Deserialize, Serialize};

use crate::params::{Labels, SearchParams};

/// A rule describing which queries a backend answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRoute {
    /// Required query type, compared case-insensitively; empty matches any type.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub log_type: String,
    /// Required id prefix; empty matches any id.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id_prefix: String,
    /// Label constraints; each key must be present in the query.
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    /// When set, a match makes this backend the only source of results.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_additive: bool,
}

impl SearchRoute {
    /// Creates a route that matches every query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires a query type.
    #[must_use]
    pub fn with_type(mut self, log_type: impl Into<String>) -> Self {
        self.log_type = log_type.into();
        self
    }

    /// Requires an id prefix.
    #[must_use]
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = prefix.into();
        self
    }

    /// Adds a label constraint.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.labels.insert(key.into(), pattern.into());
        self
    }

    /// Marks the route additive.
    #[must_use]
    pub const fn additive(mut self) -> Self {
        self.is_additive = true;
        self
    }

    /// Returns true if this route accepts `params`.
    #[must_use]
    pub fn matches(&self, params: &SearchParams) -> bool {
        if !self.log_type.is_empty() && !self.log_type.eq_ignore_ascii_case(&params.log_type) {
            return false;
        }
        if !self.id_prefix.is_empty() && !params.id.starts_with(&self.id_prefix) {
            return false;
        }
        self.labels.iter().all(|(key, pattern)| {
            params
                .labels
                .get(key)
                .is_some_and(|value| label_value_matches(pattern, value))
        })
    }
}

/// Evaluates a comma-separated label pattern against a present value.
fn label_value_matches(pattern: &str, value: &str) -> bool {
    pattern.split(',').map(str::trim).any(|alt| {
        if alt == "*" {
            return true;
        }
        match alt.strip_prefix('!') {
            Some(negated) => negated != value,
            None => alt == value,
        }
    })
}

/// Outcome of matching a query against a backend's routes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouteMatch {
    /// At least one route matched.
    pub matched: bool,
    /// The first matching route is additive.
    pub additive: bool,
}

impl RouteMatch {
    /// No route matched.
    pub const NONE: Self = Self {
        matched: false,
        additive: false,
    };

    /// Matched by a non-additive route.
    pub const MATCHED: Self = Self {
        matched: true,
        additive: false,
    };

    /// Matched by an additive route.
    pub const ADDITIVE: Self = Self {
        matched: true,
        additive: true,
    };
}

/// The ordered routes of one backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteSet(Vec<SearchRoute>);

impl RouteSet {
    /// Creates a route set.
    #[must_use]
    pub const fn new(routes: Vec<SearchRoute>) -> Self {
        Self(routes)
    }

    /// Finds the first route accepting `params`.
    ///
    /// An empty set never matches.
    #[must_use]
    pub fn match_params(&self, params: &SearchParams) -> RouteMatch {
        match_backend(&self.0, params)
    }

    /// Trims surrounding whitespace from every label pattern alternative.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self(
            self.0
                .into_iter()
                .map(|mut route| {
                    for pattern in route.labels.values_mut() {
                        *pattern = pattern
                            .split(',')
                            .map(str::trim)
                            .collect::<Vec<_>>()
                            .join(",");
                    }
                    route
                })
                .collect(),
        )
    }

    /// Iterates over the routes in order.
    pub fn iter(&self) -> std::slice::Iter<'_, SearchRoute> {
        self.0.iter()
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set holds no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<SearchRoute>> for RouteSet {
    fn from(routes: Vec<SearchRoute>) -> Self {
        Self(routes)
    }
}

impl FromIterator<SearchRoute> for RouteSet {
    fn from_iter<I: IntoIterator<Item = SearchRoute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RouteSet {
    type Item = &'a SearchRoute;
    type IntoIter = std::slice::Iter<'a, SearchRoute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Matches `params` against a slice of routes.
#[must_use]
pub fn match_backend(routes: &[SearchRoute], params: &SearchParams) -> RouteMatch {
    routes
        .iter()
        .find(|route| route.matches(params))
        .map_or(RouteMatch::NONE, |route| RouteMatch {
            matched: true,
            additive: route.is_additive,
        })
}
