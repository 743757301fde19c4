//! Elasticsearch and OpenSearch backends.
//!
//! Both speak the same `_search` API. The configured query template is
//! rendered against the search params and posted with `size = limit + 1`;
//! the extra sentinel hit only tells whether another page exists and is
//! never returned.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use loghub_core::{
    merge_labels, BackendFuture, BackendKind, Labels, LogBackend, RouteSet, SearchParams,
    SearchResult, SearchResults,
};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{ElasticFields, ElasticsearchConfig, OpenSearchConfig};
use crate::error::{ConfigError, Result};
use crate::http::{self, TlsOptions};
use crate::template::QueryTemplate;

/// Body sent when no query template is configured.
const MATCH_ALL: &str = r#"{"query":{"match_all":{}}}"#;

#[derive(Clone)]
enum Auth {
    None,
    Basic { username: String, password: Option<String> },
    ApiKey(String),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => write!(f, "Basic({username})"),
            Self::ApiKey(_) => f.write_str("ApiKey"),
        }
    }
}

impl Auth {
    fn from_parts(username: Option<String>, password: Option<String>, api_key: Option<String>) -> Self {
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            return Self::ApiKey(key);
        }
        match username.filter(|u| !u.is_empty()) {
            Some(username) => Self::Basic { username, password },
            None => Self::None,
        }
    }

    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::None => request,
            Self::Basic { username, password } => request.basic_auth(username, password.as_ref()),
            Self::ApiKey(key) => request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {key}")),
        }
    }
}

/// A `_search` backend for Elasticsearch or OpenSearch.
#[derive(Debug)]
pub struct ElasticBackend {
    name: String,
    kind: BackendKind,
    routes: RouteSet,
    labels: Labels,
    timeout: Option<Duration>,
    client: reqwest::Client,
    base_url: String,
    index: String,
    template: QueryTemplate,
    fields: ElasticFields,
    auth: Auth,
}

struct Parts {
    kind: BackendKind,
    index_in_config: usize,
    common: loghub_core::CommonBackend,
    base_url: String,
    index: String,
    query: String,
    fields: ElasticFields,
    auth: Auth,
    tls: (Option<std::path::PathBuf>, bool),
}

impl ElasticBackend {
    /// Builds an Elasticsearch backend.
    ///
    /// # Errors
    ///
    /// Returns an error when the index is empty, neither or both of
    /// `address` and `cloudId` are set, the cloud id is malformed, or the
    /// query template does not parse.
    pub fn elasticsearch(config: ElasticsearchConfig, index: usize) -> Result<Self> {
        let kind = BackendKind::Elasticsearch;
        let address = config.address.filter(|a| !a.trim().is_empty());
        let cloud_id = config.cloud_id.filter(|c| !c.trim().is_empty());
        let base_url = match (address, cloud_id) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflict {
                    kind,
                    reason: "provide either an address or a cloudId, not both".to_string(),
                });
            }
            (Some(address), None) => http::parse_base_url(kind, "address", &address)?,
            (None, Some(cloud_id)) => decode_cloud_id(&cloud_id)
                .map_err(|reason| ConfigError::invalid(kind, "cloudId", reason))?,
            (None, None) => return Err(ConfigError::missing(kind, "address")),
        };

        Self::build(Parts {
            kind,
            index_in_config: index,
            common: config.common,
            base_url,
            index: config.index,
            query: config.query,
            fields: config.fields,
            auth: Auth::from_parts(config.username, config.password, config.api_key),
            tls: (config.ca_file, config.insecure_skip_tls_verify),
        })
    }

    /// Builds an OpenSearch backend.
    ///
    /// # Errors
    ///
    /// Returns an error when the index or address is missing or the query
    /// template does not parse.
    pub fn opensearch(config: OpenSearchConfig, index: usize) -> Result<Self> {
        let kind = BackendKind::OpenSearch;
        let address = config
            .address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| ConfigError::missing(kind, "address"))?;

        Self::build(Parts {
            kind,
            index_in_config: index,
            common: config.common,
            base_url: http::parse_base_url(kind, "address", &address)?,
            index: config.index,
            query: config.query,
            fields: config.fields,
            auth: Auth::from_parts(config.username, config.password, None),
            tls: (config.ca_file, config.insecure_skip_tls_verify),
        })
    }

    fn build(parts: Parts) -> Result<Self> {
        let kind = parts.kind;
        let index = parts.index.trim().to_string();
        if index.is_empty() {
            return Err(ConfigError::missing(kind, "index"));
        }
        if parts.fields.message.trim().is_empty() {
            return Err(ConfigError::missing(kind, "fields.message"));
        }
        let template =
            QueryTemplate::parse(&parts.query).map_err(|e| ConfigError::invalid(kind, "query", e))?;
        let client = http::build_client(
            kind,
            &TlsOptions {
                ca_file: parts.tls.0.as_deref(),
                insecure_skip_verify: parts.tls.1,
            },
        )?;

        Ok(Self {
            name: parts.common.resolved_name(kind, parts.index_in_config),
            kind,
            timeout: parts.common.timeout(),
            routes: parts.common.routes.normalized(),
            labels: parts.common.labels,
            client,
            base_url: parts.base_url,
            index,
            template,
            fields: parts.fields,
            auth: parts.auth,
        })
    }

    /// The resolved base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn do_search(&self, params: &SearchParams) -> loghub_core::Result<SearchResults> {
        let body = if self.template.is_empty() {
            MATCH_ALL.to_string()
        } else {
            self.template.render(params)
        };
        let url = format!("{}/{}/_search", self.base_url, self.index);
        let size = params.limit.saturating_add(1);

        debug!(backend = %self.name, %url, size, "searching index");
        let request = self
            .client
            .post(&url)
            .query(&[("size", size)])
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let response = self
            .auth
            .apply(request)
            .send()
            .await
            .map_err(|e| http::request_error(&e))?;
        let response: SearchResponse = http::read_json(response).await?;

        Ok(self.to_results(response.hits, params.limit))
    }

    fn to_results(&self, hits: Hits, limit: u64) -> SearchResults {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let total = hits
            .total
            .map_or(hits.hits.len() as u64, |total| total.value());

        // Only a returned sentinel row means there is another page.
        let next_page = if hits.hits.len() > limit {
            limit
                .checked_sub(1)
                .and_then(|last| hits.hits.get(last))
                .and_then(|hit| hit.sort.as_ref())
                .map(|sort| Value::Array(sort.clone()).to_string())
        } else {
            None
        };

        let results = hits
            .hits
            .into_iter()
            .take(limit)
            .filter_map(|hit| self.to_result(hit))
            .collect();

        SearchResults {
            total,
            results,
            next_page,
        }
    }

    fn to_result(&self, hit: Hit) -> Option<SearchResult> {
        let Some(message) = hit.source.get(&self.fields.message) else {
            debug!(backend = %self.name, field = %self.fields.message, "hit has no message field");
            return None;
        };
        let message = stringify(message);
        let time = hit
            .source
            .get(&self.fields.timestamp)
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut derived = Labels::new();
        for (key, value) in &hit.source {
            if *key == self.fields.message
                || *key == self.fields.timestamp
                || self.fields.exclusions.contains(key)
            {
                continue;
            }
            flatten_into(key, value, &mut derived);
        }
        derived.retain(|key, _| !self.fields.exclusions.contains(key));

        Some(SearchResult {
            id: hit.id,
            time,
            message,
            labels: merge_labels(&self.labels, derived),
        })
    }

    async fn do_ping(&self) -> loghub_core::Result<()> {
        let response = self
            .auth
            .apply(self.client.get(&self.base_url))
            .send()
            .await
            .map_err(|e| http::request_error(&e))?;
        http::check_status(response).await.map(|_| ())
    }
}

impl LogBackend for ElasticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
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

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<TotalHits>,
    #[serde(default)]
    hits: Vec<Hit>,
}

/// `hits.total` is an object since Elasticsearch 7 and a number before.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Object { value: u64 },
    Count(u64),
}

impl TotalHits {
    const fn value(&self) -> u64 {
        match self {
            Self::Object { value } | Self::Count(value) => *value,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
    #[serde(default)]
    sort: Option<Vec<Value>>,
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flattens nested objects and arrays into dot-separated label keys.
fn flatten_into(prefix: &str, value: &Value, out: &mut Labels) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(&format!("{prefix}.{key}"), nested, out);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}.{i}"), nested, out);
            }
        }
        Value::Null => {}
        scalar => {
            out.insert(prefix.to_string(), stringify(scalar));
        }
    }
}

/// Turns an Elastic Cloud id into the deployment's Elasticsearch URL.
///
/// The id is `<label>:<base64 of host$es-uuid$kibana-uuid>`.
fn decode_cloud_id(cloud_id: &str) -> std::result::Result<String, String> {
    let encoded = cloud_id
        .split_once(':')
        .map_or(cloud_id, |(_, encoded)| encoded)
        .trim();
    let decoded = BASE64
        .decode(encoded)
        .map_err(|e| format!("not valid base64: {e}"))?;
    let decoded = String::from_utf8(decoded).map_err(|_| "not valid UTF-8".to_string())?;

    let mut parts = decoded.split('$');
    let host = parts.next().unwrap_or_default().trim_end_matches('/');
    let es_uuid = parts.next().unwrap_or_default();
    if host.is_empty() || es_uuid.is_empty() {
        return Err("expected host$elasticsearch-uuid".to_string());
    }

    Ok(match host.split_once(':') {
        Some((domain, port)) => format!("https://{es_uuid}.{domain}:{port}"),
        None => format!("https://{es_uuid}.{host}"),
    })
}
