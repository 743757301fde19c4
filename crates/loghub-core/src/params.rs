//! The normalized search request.
//!
//! This module provides:
//! - [`SearchParams`]: one search request as it arrives on the wire
//! - [`parse_age`] / [`parse_time_expr`]: relative-age and RFC3339 parsing
//! - Field defaulting via [`SearchParams::resolve`]
//!
//! Resolved start and end instants are memoized on the params value so every
//! backend reading the same request sees bit-for-bit identical bounds.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Label set carried by queries, routes and results.
pub type Labels = BTreeMap<String, String>;

/// Default lookback when `start` is not given.
pub const DEFAULT_START: &str = "1h";
/// Default maximum number of results.
pub const DEFAULT_LIMIT: u64 = 50;
/// Default per-item (pod, container, file) line cap.
pub const DEFAULT_LIMIT_PER_ITEM: u64 = 100;
/// Default per-item byte cap.
pub const DEFAULT_LIMIT_BYTES_PER_ITEM: u64 = 102_400;

static AGE_EXPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:ms|s|m|h|d|w|y))+$").unwrap_or_else(|_| unreachable!())
});
static AGE_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(ms|s|m|h|d|w|y)").unwrap_or_else(|_| unreachable!()));

/// A normalized search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    /// Maximum number of results to return.
    #[serde(skip_serializing_if = "is_zero")]
    pub limit: u64,
    /// Overall byte cap, for backends that support one.
    #[serde(skip_serializing_if = "is_zero")]
    pub limit_bytes: u64,
    /// Continuation token returned by a previous search.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub page: String,
    /// Labels that every result must carry.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Free-form query passed through to backends with a native query language.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub query: String,
    /// RFC3339 timestamp or relative age such as `1h`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub start: String,
    /// RFC3339 timestamp or relative age such as `10m`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub end: String,
    /// Logical source kind, e.g. `KubernetesPod`.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub log_type: String,
    /// Identifier within `log_type`; may be `namespace/name`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Line cap applied per matched item.
    #[serde(skip_serializing_if = "is_zero")]
    pub limit_per_item: u64,
    /// Byte cap applied per matched item.
    #[serde(skip_serializing_if = "is_zero")]
    pub limit_bytes_per_item: u64,
    #[serde(skip)]
    instants: InstantCache,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl SearchParams {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies field defaults and pins the resolved instants.
    ///
    /// Idempotent: resolving an already resolved value changes nothing.
    #[must_use]
    pub fn resolve(mut self) -> Self {
        self.apply_defaults();
        // Warm both instants against a single "now".
        let _ = self.start_instant();
        let _ = self.end_instant();
        self
    }

    /// Fills every unset field with its default.
    pub fn apply_defaults(&mut self) {
        if self.start.is_empty() {
            self.start = DEFAULT_START.to_string();
        }
        if self.limit == 0 {
            self.limit = DEFAULT_LIMIT;
        }
        if self.limit_per_item == 0 {
            self.limit_per_item = DEFAULT_LIMIT_PER_ITEM;
        }
        if self.limit_bytes_per_item == 0 {
            self.limit_bytes_per_item = DEFAULT_LIMIT_BYTES_PER_ITEM;
        }
    }

    /// Absolute start of the search window, or `None` when unbounded.
    ///
    /// The first call fixes the value; later calls return the same instant
    /// as long as `start` is unchanged.
    #[must_use]
    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.instants.resolve(Bound::Start, &self.start)
    }

    /// Absolute end of the search window, or `None` when unbounded.
    #[must_use]
    pub fn end_instant(&self) -> Option<DateTime<Utc>> {
        self.instants.resolve(Bound::End, &self.end)
    }

    /// Splits `id` into an optional namespace and a name.
    #[must_use]
    pub fn namespaced_id(&self) -> (Option<&str>, &str) {
        match self.id.split_once('/') {
            Some((namespace, name)) => (Some(namespace), name),
            None => (None, self.id.as_str()),
        }
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the per-item limit.
    #[must_use]
    pub const fn with_limit_per_item(mut self, limit: u64) -> Self {
        self.limit_per_item = limit;
        self
    }

    /// Sets the source type.
    #[must_use]
    pub fn with_type(mut self, log_type: impl Into<String>) -> Self {
        self.log_type = log_type.into();
        self
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Sets the free-form query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Sets the start expression.
    #[must_use]
    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = start.into();
        self
    }

    /// Sets the end expression.
    #[must_use]
    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = end.into();
        self
    }

    /// Sets the page token.
    #[must_use]
    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = page.into();
        self
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={:?} id={:?} query={:?} start={:?} end={:?} limit={}",
            self.log_type, self.id, self.query, self.start, self.end, self.limit
        )?;
        if !self.labels.is_empty() {
            let labels: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            write!(f, " labels={}", labels.join(","))?;
        }
        if !self.page.is_empty() {
            write!(f, " page={:?}", self.page)?;
        }
        Ok(())
    }
}

/// Parses a relative age such as `90s`, `1h30m` or `2d`.
///
/// Units: `ms`, `s`, `m`, `h`, `d`, `w`, `y` (365 days).
#[must_use]
pub fn parse_age(expr: &str) -> Option<TimeDelta> {
    let expr = expr.trim();
    if !AGE_EXPR.is_match(expr) {
        return None;
    }

    let mut total = TimeDelta::zero();
    for caps in AGE_PART.captures_iter(expr) {
        let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
        let part = match caps.get(2)?.as_str() {
            "ms" => TimeDelta::try_milliseconds(amount),
            "s" => TimeDelta::try_seconds(amount),
            "m" => TimeDelta::try_minutes(amount),
            "h" => TimeDelta::try_hours(amount),
            "d" => TimeDelta::try_days(amount),
            "w" => TimeDelta::try_weeks(amount),
            "y" => amount.checked_mul(365).and_then(TimeDelta::try_days),
            _ => None,
        }?;
        total = total.checked_add(&part)?;
    }
    Some(total)
}

/// Resolves a time expression against `now`.
///
/// An age is subtracted from `now`; otherwise the value must be RFC3339.
/// Anything else is treated as unbounded.
#[must_use]
pub fn parse_time_expr(expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }
    if let Some(age) = parse_age(expr) {
        return now.checked_sub_signed(age);
    }
    DateTime::parse_from_rfc3339(expr)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Start,
    End,
}

#[derive(Debug, Clone)]
struct CachedInstant {
    raw: String,
    value: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct CacheSlots {
    now: Option<DateTime<Utc>>,
    start: Option<CachedInstant>,
    end: Option<CachedInstant>,
}

/// Memo for the resolved instants, keyed by the raw field value.
///
/// Cloning copies the cached values, so a resolved request and its clones
/// agree on their bounds.
#[derive(Default)]
struct InstantCache {
    slots: Arc<Mutex<CacheSlots>>,
}

impl InstantCache {
    fn resolve(&self, bound: Bound, raw: &str) -> Option<DateTime<Utc>> {
        let mut slots = self.slots.lock();
        let cached = match bound {
            Bound::Start => &slots.start,
            Bound::End => &slots.end,
        };
        if let Some(hit) = cached {
            if hit.raw == raw {
                return hit.value;
            }
        }

        let now = *slots.now.get_or_insert_with(Utc::now);
        let value = parse_time_expr(raw, now);
        let entry = Some(CachedInstant {
            raw: raw.to_string(),
            value,
        });
        match bound {
            Bound::Start => slots.start = entry,
            Bound::End => slots.end = entry,
        }
        value
    }
}

impl Clone for InstantCache {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::new(Mutex::new(self.slots.lock().clone())),
        }
    }
}

impl fmt::Debug for InstantCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstantCache").finish_non_exhaustive()
    }
}

// Derived data, not part of a request's identity.
impl PartialEq for InstantCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for InstantCache {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    #[test]
    fn resolve_applies_defaults() {
        let params = SearchParams::new().resolve();

        assert_eq!(params.start, "1h");
        assert_eq!(params.limit, 50);
        assert_eq!(params.limit_per_item, 100);
        assert_eq!(params.limit_bytes_per_item, 102_400);
        assert!(params.end.is_empty());
        assert_eq!(params.limit_bytes, 0);
    }

    #[test]
    fn resolve_is_idempotent() {
        let once = SearchParams::new().with_label("app", "web").resolve();
        let twice = once.clone().resolve();

        assert_eq!(once, twice);
        assert_eq!(once.start_instant(), twice.start_instant());
    }

    #[test]
    fn resolve_keeps_explicit_values() {
        let params = SearchParams::new()
            .with_limit(7)
            .with_limit_per_item(3)
            .with_start("2d")
            .resolve();

        assert_eq!(params.limit, 7);
        assert_eq!(params.limit_per_item, 3);
        assert_eq!(params.start, "2d");
    }

    #[test_case("1h", Some(TimeDelta::hours(1)) ; "hours")]
    #[test_case("90s", Some(TimeDelta::seconds(90)) ; "seconds")]
    #[test_case("15m", Some(TimeDelta::minutes(15)) ; "minutes")]
    #[test_case("250ms", Some(TimeDelta::milliseconds(250)) ; "milliseconds")]
    #[test_case("2d", Some(TimeDelta::days(2)) ; "days")]
    #[test_case("1w", Some(TimeDelta::weeks(1)) ; "weeks")]
    #[test_case("1y", Some(TimeDelta::days(365)) ; "years")]
    #[test_case("1h30m", Some(TimeDelta::minutes(90)) ; "compound")]
    #[test_case("", None ; "empty")]
    #[test_case("h", None ; "missing amount")]
    #[test_case("10", None ; "missing unit")]
    #[test_case("1 hour", None ; "words")]
    #[test_case("-1h", None ; "negative")]
    fn age_parsing(expr: &str, expected: Option<TimeDelta>) {
        assert_eq!(parse_age(expr), expected);
    }

    #[test]
    fn time_expr_relative() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let got = parse_time_expr("2h", now);
        assert_eq!(got, Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()));
    }

    #[test]
    fn time_expr_absolute() {
        let now = Utc::now();
        let got = parse_time_expr("2024-05-01T10:00:00+02:00", now);
        assert_eq!(got, Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()));
    }

    #[test]
    fn time_expr_unparseable_is_unbounded() {
        assert_eq!(parse_time_expr("yesterday", Utc::now()), None);
        assert_eq!(parse_time_expr("2024-13-45", Utc::now()), None);
    }

    #[test]
    fn start_instant_is_memoized() {
        let params = SearchParams::new().resolve();
        let first = params.start_instant();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = params.start_instant();

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn clones_share_resolved_instants() {
        let params = SearchParams::new().with_end("5m").resolve();
        let cloned = params.clone();
        std::thread::sleep(std::time::Duration::from_millis(5));

        assert_eq!(params.start_instant(), cloned.start_instant());
        assert_eq!(params.end_instant(), cloned.end_instant());
    }

    #[test]
    fn start_and_end_use_the_same_now() {
        let params = SearchParams::new().with_start("2h").with_end("1h").resolve();
        let start = params.start_instant().unwrap();
        let end = params.end_instant().unwrap();

        assert_eq!(end - start, TimeDelta::hours(1));
    }

    #[test]
    fn changing_start_invalidates_cache() {
        let mut params = SearchParams::new().with_start("1h").resolve();
        let one_hour = params.start_instant().unwrap();
        params.start = "3h".to_string();
        let three_hours = params.start_instant().unwrap();

        assert_eq!(one_hour - three_hours, TimeDelta::hours(2));
    }

    #[test]
    fn unparseable_start_is_unbounded() {
        let params = SearchParams::new().with_start("whenever").resolve();
        assert_eq!(params.start_instant(), None);
        assert_eq!(params.end_instant(), None);
    }

    #[test]
    fn namespaced_id_splits_on_first_slash() {
        let params = SearchParams::new().with_id("kube-system/coredns");
        assert_eq!(params.namespaced_id(), (Some("kube-system"), "coredns"));

        let params = SearchParams::new().with_id("coredns");
        assert_eq!(params.namespaced_id(), (None, "coredns"));
    }

    #[test]
    fn deserializes_camel_case_wire_format() {
        let json = r#"{
            "limit": 10,
            "limitPerItem": 5,
            "limitBytesPerItem": 2048,
            "type": "KubernetesPod",
            "id": "default/web-1",
            "labels": {"app": "web"},
            "start": "30m"
        }"#;
        let params: SearchParams = serde_json::from_str(json).unwrap();

        assert_eq!(params.limit, 10);
        assert_eq!(params.limit_per_item, 5);
        assert_eq!(params.limit_bytes_per_item, 2048);
        assert_eq!(params.log_type, "KubernetesPod");
        assert_eq!(params.id, "default/web-1");
        assert_eq!(params.labels.get("app").map(String::as_str), Some("web"));
        assert_eq!(params.start, "30m");
    }

    #[test]
    fn serialization_omits_unset_fields() {
        let json = serde_json::to_value(SearchParams::new().with_type("File")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "File"}));
    }

    #[test]
    fn display_summarizes_query() {
        let params = SearchParams::new()
            .with_type("KubernetesPod")
            .with_label("app", "web")
            .resolve();
        let summary = params.to_string();

        assert!(summary.contains("type=\"KubernetesPod\""));
        assert!(summary.contains("labels=app=web"));
        assert!(summary.contains("limit=50"));
    }
}
