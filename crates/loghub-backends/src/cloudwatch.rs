//! CloudWatch Logs backend.
//!
//! Runs a Logs Insights query against one log group: `StartQuery`, then
//! `GetQueryResults` every poll interval until the query reaches a terminal
//! state or the attempts run out. Requests go to the JSON 1.1 API and are
//! signed with [`crate::sigv4`].

use std::time::Duration;

use chrono::{NaiveDateTime, SecondsFormat, Utc};
use loghub_core::{
    BackendError, BackendFuture, BackendKind, Labels, LogBackend, RouteSet, SearchParams,
    SearchResult, SearchResults,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::CloudWatchConfig;
use crate::error::{ConfigError, Result};
use crate::http::{self, TlsOptions};
use crate::sigv4::{Credentials, SignableRequest, Signer};

const SERVICE: &str = "logs";
const TARGET_PREFIX: &str = "Logs_20140328";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
/// Layout of `@timestamp` values, always UTC.
const TIMESTAMP_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.3f";
/// Largest `limit` accepted by `StartQuery`.
const MAX_QUERY_LIMIT: u64 = 10_000;

/// Searches a log group with Logs Insights.
#[derive(Debug)]
pub struct CloudWatchBackend {
    name: String,
    routes: RouteSet,
    labels: Labels,
    timeout: Option<Duration>,
    client: reqwest::Client,
    endpoint: Url,
    signer: Signer,
    log_group: String,
    query: String,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl CloudWatchBackend {
    /// Builds the backend, taking missing credentials from the `AWS_*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when the region, log group or credentials are
    /// missing, or the endpoint is not a valid URL.
    pub fn from_config(config: CloudWatchConfig, index: usize) -> Result<Self> {
        Self::with_env(config, index, |key| std::env::var(key).ok())
    }

    /// Like [`from_config`](Self::from_config), reading fallback
    /// credentials through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`from_config`](Self::from_config).
    pub fn with_env<F>(config: CloudWatchConfig, index: usize, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let kind = BackendKind::CloudWatch;
        let region = config.region.trim().to_string();
        if region.is_empty() {
            return Err(ConfigError::missing(kind, "region"));
        }
        let log_group = config.log_group.trim().to_string();
        if log_group.is_empty() {
            return Err(ConfigError::missing(kind, "logGroup"));
        }

        let credentials = configured_credentials(&config)?
            .or_else(|| Credentials::from_lookup(lookup))
            .ok_or_else(|| ConfigError::missing(kind, "accessKeyId"))?;

        let endpoint = match config.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            Some(raw) => http::parse_base_url(kind, "endpoint", raw)?,
            None => format!("https://logs.{region}.amazonaws.com"),
        };
        let endpoint = Url::parse(&endpoint).map_err(|e| ConfigError::invalid(kind, "endpoint", e))?;
        let client = http::build_client(kind, &TlsOptions::default())?;
        let query = config.query().to_string();
        let poll_interval = config.poll_interval();
        let max_poll_attempts = config.max_poll_attempts();

        Ok(Self {
            name: config.common.resolved_name(kind, index),
            timeout: config.common.timeout(),
            routes: config.common.routes.normalized(),
            labels: config.common.labels,
            client,
            endpoint,
            signer: Signer::new(credentials, region, SERVICE),
            log_group,
            query,
            poll_interval,
            max_poll_attempts,
        })
    }

    /// The endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, body: &Value) -> loghub_core::Result<T> {
        let mut request = SignableRequest::new("POST", self.endpoint.clone(), serde_json::to_vec(body)?)
            .with_header("content-type", CONTENT_TYPE)
            .with_header("x-amz-target", format!("{TARGET_PREFIX}.{action}"));
        self.signer.sign(&mut request, Utc::now());

        let mut builder = self.client.post(self.endpoint.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| http::request_error(&e))?;
        http::read_json(response).await
    }

    async fn do_search(&self, params: &SearchParams) -> loghub_core::Result<SearchResults> {
        let mut body = json!({
            "logGroupName": self.log_group,
            "queryString": self.query,
            "endTime": params.end_instant().unwrap_or_else(Utc::now).timestamp(),
            "limit": params.limit.clamp(1, MAX_QUERY_LIMIT),
        });
        if let Some(start) = params.start_instant() {
            body["startTime"] = json!(start.timestamp());
        }

        let started: StartQueryResponse = self.call("StartQuery", &body).await?;
        let query_id = started.query_id;
        debug!(backend = %self.name, %query_id, log_group = %self.log_group, "insights query started");

        for attempt in 1..=self.max_poll_attempts {
            let response: QueryResultsResponse = self
                .call("GetQueryResults", &json!({ "queryId": query_id }))
                .await?;
            match response.status.as_str() {
                "Complete" => return Ok(self.to_results(response)),
                "Failed" | "Timeout" | "Cancelled" => {
                    return Err(BackendError::QueryFailed(format!(
                        "insights query {query_id} ended with status {}",
                        response.status
                    )));
                }
                status => {
                    debug!(backend = %self.name, %query_id, status, attempt, "insights query pending");
                    if attempt < self.max_poll_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }

        self.stop_query(&query_id).await;
        Err(BackendError::Timeout(
            self.poll_interval.saturating_mul(self.max_poll_attempts),
        ))
    }

    async fn stop_query(&self, query_id: &str) {
        let stopped: loghub_core::Result<Value> = self.call("StopQuery", &json!({ "queryId": query_id })).await;
        if let Err(e) = stopped {
            warn!(backend = %self.name, query_id, error = %e, "failed to stop insights query");
        }
    }

    fn to_results(&self, response: QueryResultsResponse) -> SearchResults {
        let results: Vec<SearchResult> = response
            .results
            .into_iter()
            .map(|fields| {
                let mut result = SearchResult::default().with_labels(self.labels.clone());
                for field in fields {
                    let value = field.value.unwrap_or_default();
                    match field.field.as_str() {
                        "@message" => result.message = value,
                        "@timestamp" => result.time = to_rfc3339(&value),
                        "@ptr" => result.id = Some(value),
                        _ => {}
                    }
                }
                result
            })
            .collect();

        let total = response
            .statistics
            .map_or(results.len() as u64, |stats| records(stats.records_matched));
        SearchResults::from_results(results).with_total(total)
    }

    async fn do_ping(&self) -> loghub_core::Result<()> {
        let body = json!({ "logGroupNamePrefix": self.log_group, "limit": 1 });
        let _: Value = self.call("DescribeLogGroups", &body).await?;
        Ok(())
    }
}

impl LogBackend for CloudWatchBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::CloudWatch
    }

    fn routes(&self) -> &RouteSet {
        &self.routes
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn search<'a>(&'a self, params: &'a SearchParams) -> BackendFuture<'a, SearchResults> {
        Box::pin(self.do_search(params))
    }

    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(self.do_ping())
    }
}

fn configured_credentials(config: &CloudWatchConfig) -> Result<Option<Credentials>> {
    let key = config.access_key_id.as_deref().filter(|k| !k.is_empty());
    let secret = config.secret_access_key.as_deref().filter(|s| !s.is_empty());
    match (key, secret) {
        (Some(key), Some(secret)) => {
            let credentials = Credentials::new(key, secret);
            Ok(Some(match config.session_token.as_deref().filter(|t| !t.is_empty()) {
                Some(token) => credentials.with_session_token(token),
                None => credentials,
            }))
        }
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::missing(BackendKind::CloudWatch, "secretAccessKey")),
        (None, Some(_)) => Err(ConfigError::missing(BackendKind::CloudWatch, "accessKeyId")),
    }
}

fn to_rfc3339(value: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_LAYOUT)
        .ok()
        .map(|naive| naive.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// `recordsMatched` is a double on the wire.
fn records(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartQueryResponse {
    query_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultsResponse {
    status: String,
    #[serde(default)]
    results: Vec<Vec<ResultField>>,
    #[serde(default)]
    statistics: Option<QueryStatistics>,
}

#[derive(Debug, Deserialize)]
struct ResultField {
    field: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatistics {
    #[serde(default)]
    records_matched: f64,
}
