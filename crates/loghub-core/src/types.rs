//! Result types shared by every backend.
//!
//! This module provides:
//! - [`SearchResult`]: one log line with optional id, timestamp and labels
//! - [`SearchResults`]: a page of results with a total and continuation token
//! - [`merge_labels`]: static/derived label merging

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::params::Labels;

/// A single log line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Backend-specific identifier of the line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// RFC3339 timestamp, when the backend knows one.
    #[serde(rename = "timestamp", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// The log text.
    #[serde(default)]
    pub message: String,
    /// Labels describing where the line came from.
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl SearchResult {
    /// Creates a result carrying only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Parses a line prefixed with an RFC3339 timestamp, as emitted by
    /// runtimes that stamp each line.
    ///
    /// When the first space-separated token is not a timestamp the whole
    /// line becomes the message.
    #[must_use]
    pub fn from_timestamped_line(line: &str) -> Self {
        let (token, rest) = line.split_once(' ').unwrap_or((line, ""));
        if DateTime::parse_from_rfc3339(token).is_ok() {
            Self {
                time: Some(token.to_string()),
                message: rest.to_string(),
                ..Self::default()
            }
        } else {
            Self::new(line)
        }
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// Replaces the label set.
    #[must_use]
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    /// Adds one label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A page of results.
///
/// `Default` is the empty page and the identity for [`SearchResults::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Number of matching lines the backend knows about; may exceed `results.len()`.
    #[serde(default)]
    pub total: u64,
    /// The returned lines.
    #[serde(default)]
    pub results: Vec<SearchResult>,
    /// Opaque continuation token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
}

impl SearchResults {
    /// Wraps a list of results, using its length as the total.
    #[must_use]
    pub fn from_results(results: Vec<SearchResult>) -> Self {
        Self {
            total: results.len() as u64,
            results,
            next_page: None,
        }
    }

    /// Sets the total.
    #[must_use]
    pub const fn with_total(mut self, total: u64) -> Self {
        self.total = total;
        self
    }

    /// Sets the continuation token.
    #[must_use]
    pub fn with_next_page(mut self, next_page: impl Into<String>) -> Self {
        self.next_page = Some(next_page.into());
        self
    }

    /// Appends `other` onto `self`.
    ///
    /// Results keep their order, totals add up, and the continuation token
    /// is always taken from `other`, including when it has none.
    pub fn merge(&mut self, other: Self) {
        self.results.extend(other.results);
        self.total = self.total.saturating_add(other.total);
        self.next_page = other.next_page;
    }

    /// Consuming form of [`SearchResults::merge`].
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        self.merge(other);
        self
    }

    /// Number of returned lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when no lines were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Merges a backend's static labels with labels derived from a line.
///
/// Derived labels win on key collisions.
#[must_use]
pub fn merge_labels(static_labels: &Labels, derived: Labels) -> Labels {
    let mut merged = static_labels.clone();
    merged.extend(derived);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn page(messages: &[&str], total: u64, next: Option<&str>) -> SearchResults {
        SearchResults {
            total,
            results: messages.iter().map(|m| SearchResult::new(*m)).collect(),
            next_page: next.map(str::to_string),
        }
    }

    #[test]
    fn merge_appends_in_order() {
        let mut acc = page(&["a", "b"], 2, None);
        acc.merge(page(&["c"], 10, Some("tok")));

        let messages: Vec<&str> = acc.results.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
        assert_eq!(acc.total, 12);
        assert_eq!(acc.next_page.as_deref(), Some("tok"));
    }

    #[test]
    fn merge_clears_next_page_when_latest_has_none() {
        let acc = page(&["a"], 1, Some("tok")).merged(page(&[], 0, None));
        assert_eq!(acc.next_page, None);
    }

    #[test]
    fn default_is_merge_identity() {
        let value = page(&["x", "y"], 5, Some("p"));
        assert_eq!(SearchResults::default().merged(value.clone()), value);
    }

    #[test]
    fn from_results_counts_total() {
        let results = SearchResults::from_results(vec![SearchResult::new("a"), SearchResult::new("b")]);
        assert_eq!(results.total, 2);
        assert_eq!(results.len(), 2);
        assert!(!results.is_empty());
    }

    #[test]
    fn timestamped_line_is_split() {
        let result =
            SearchResult::from_timestamped_line("2024-05-01T10:00:00.123456789Z GET /healthz 200");
        assert_eq!(result.time.as_deref(), Some("2024-05-01T10:00:00.123456789Z"));
        assert_eq!(result.message, "GET /healthz 200");
    }

    #[test]
    fn line_without_timestamp_is_kept_whole() {
        let result = SearchResult::from_timestamped_line("starting server on :8080");
        assert_eq!(result.time, None);
        assert_eq!(result.message, "starting server on :8080");
    }

    #[test]
    fn bare_timestamp_has_empty_message() {
        let result = SearchResult::from_timestamped_line("2024-05-01T10:00:00Z");
        assert_eq!(result.time.as_deref(), Some("2024-05-01T10:00:00Z"));
        assert_eq!(result.message, "");
    }

    #[test]
    fn derived_labels_win() {
        let mut static_labels = Labels::new();
        static_labels.insert("env".to_string(), "prod".to_string());
        static_labels.insert("path".to_string(), "configured".to_string());
        let mut derived = Labels::new();
        derived.insert("path".to_string(), "/var/log/app.log".to_string());

        let merged = merge_labels(&static_labels, derived);
        assert_eq!(merged.get("env").map(String::as_str), Some("prod"));
        assert_eq!(merged.get("path").map(String::as_str), Some("/var/log/app.log"));
    }

    #[test]
    fn serializes_with_wire_names() {
        let results = SearchResults::from_results(vec![
            SearchResult::new("hello")
                .with_id("1")
                .with_time("2024-05-01T10:00:00Z")
                .with_label("app", "web"),
        ])
        .with_next_page("[1]");

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "total": 1,
                "results": [{
                    "id": "1",
                    "timestamp": "2024-05-01T10:00:00Z",
                    "message": "hello",
                    "labels": {"app": "web"}
                }],
                "nextPage": "[1]"
            })
        );
    }

    fn arb_page() -> impl Strategy<Value = SearchResults> {
        (
            prop::collection::vec("[a-z]{0,6}", 0..4),
            0u64..1000,
            prop::option::of("[a-z]{1,4}"),
        )
            .prop_map(|(messages, total, next_page)| SearchResults {
                total,
                results: messages.into_iter().map(SearchResult::new).collect(),
                next_page,
            })
    }

    proptest! {
        #[test]
        fn merge_is_associative(a in arb_page(), b in arb_page(), c in arb_page()) {
            let left = a.clone().merged(b.clone()).merged(c.clone());
            let right = a.merged(b.merged(c));
            prop_assert_eq!(left, right);
        }
    }
}
