//! Backend configuration.
//!
//! A configuration file lists backends in the order they are consulted:
//!
//! ```yaml
//! backends:
//!   - file:
//!       name: nginx
//!       routes:
//!         - type: File
//!       labels:
//!         app: nginx
//!       paths:
//!         - /var/log/nginx/*.log
//!   - elasticsearch:
//!       address: http://localhost:9200
//!       index: logs-*
//!       query: '{"query": {"match": {"message": "{{.Query}}"}}}'
//!       fields:
//!         message: message
//!         timestamp: "@timestamp"
//!       routes:
//!         - type: Elastic
//! ```
//!
//! Every entry names exactly one backend kind. `name`, `routes`, `labels` and
//! `timeout` (seconds) are accepted by every kind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use loghub_core::{BackendKind, CommonBackend};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Default Insights query for CloudWatch backends.
pub const DEFAULT_CLOUDWATCH_QUERY: &str = "fields @timestamp, @message | sort @timestamp desc";
/// Default delay between CloudWatch result polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default number of CloudWatch result polls before giving up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// The contents of one configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Backend entries in consultation order.
    #[serde(default)]
    pub backends: Vec<BackendEntry>,
}

impl GatewayConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Loads several files, concatenating their backends in argument order.
    ///
    /// # Errors
    ///
    /// Returns the first read or parse error.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut merged = Self::default();
        for path in paths {
            merged.backends.extend(Self::from_file(path)?.backends);
        }
        Ok(merged)
    }
}

/// One entry of the `backends` list, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendEntry {
    /// Elasticsearch settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticsearch: Option<ElasticsearchConfig>,
    /// OpenSearch settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opensearch: Option<OpenSearchConfig>,
    /// CloudWatch settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudwatch: Option<CloudWatchConfig>,
    /// Kubernetes settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesConfig>,
    /// File settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileConfig>,
}

impl BackendEntry {
    /// Checks that exactly one kind is named and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoKind`] or [`ConfigError::MultipleKinds`].
    pub fn into_config(self) -> Result<BackendConfig> {
        let named: Vec<&'static str> = [
            self.elasticsearch.is_some().then_some("elasticsearch"),
            self.opensearch.is_some().then_some("opensearch"),
            self.cloudwatch.is_some().then_some("cloudwatch"),
            self.kubernetes.is_some().then_some("kubernetes"),
            self.file.is_some().then_some("file"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if named.len() > 1 {
            return Err(ConfigError::MultipleKinds(named));
        }

        match self {
            Self { elasticsearch: Some(c), .. } => Ok(BackendConfig::Elasticsearch(c)),
            Self { opensearch: Some(c), .. } => Ok(BackendConfig::OpenSearch(c)),
            Self { cloudwatch: Some(c), .. } => Ok(BackendConfig::CloudWatch(c)),
            Self { kubernetes: Some(c), .. } => Ok(BackendConfig::Kubernetes(c)),
            Self { file: Some(c), .. } => Ok(BackendConfig::File(c)),
            _ => Err(ConfigError::NoKind),
        }
    }
}

/// A validated backend entry naming exactly one kind.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    /// Elasticsearch.
    Elasticsearch(ElasticsearchConfig),
    /// OpenSearch.
    OpenSearch(OpenSearchConfig),
    /// CloudWatch Logs Insights.
    CloudWatch(CloudWatchConfig),
    /// Kubernetes pod logs.
    Kubernetes(KubernetesConfig),
    /// Local files.
    File(FileConfig),
}

impl BackendConfig {
    /// The backend kind.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Elasticsearch(_) => BackendKind::Elasticsearch,
            Self::OpenSearch(_) => BackendKind::OpenSearch,
            Self::CloudWatch(_) => BackendKind::CloudWatch,
            Self::Kubernetes(_) => BackendKind::Kubernetes,
            Self::File(_) => BackendKind::File,
        }
    }
}

/// Local file backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileConfig {
    /// Name, routes, labels and timeout.
    #[serde(flatten)]
    pub common: CommonBackend,
    /// Glob patterns of files to read.
    pub paths: Vec<String>,
}

/// Which `_source` fields hold the message and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElasticFields {
    /// Field holding the log message.
    pub message: String,
    /// Field holding the timestamp.
    pub timestamp: String,
    /// Fields left out of the result labels.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<String>,
}

impl Default for ElasticFields {
    fn default() -> Self {
        Self {
            message: "message".to_string(),
            timestamp: "@timestamp".to_string(),
            exclusions: Vec::new(),
        }
    }
}

/// Elasticsearch backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElasticsearchConfig {
    /// Name, routes, labels and timeout.
    #[serde(flatten)]
    pub common: CommonBackend,
    /// Base URL; exclusive with `cloudId`.
    pub address: Option<String>,
    /// Elastic Cloud deployment id; exclusive with `address`.
    pub cloud_id: Option<String>,
    /// API key sent as `Authorization: ApiKey`.
    pub api_key: Option<String>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Index or index pattern to search.
    pub index: String,
    /// Query template, see [`crate::template`].
    pub query: String,
    /// Field mapping.
    pub fields: ElasticFields,
    /// Extra root certificate.
    pub ca_file: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
}

/// OpenSearch backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenSearchConfig {
    /// Name, routes, labels and timeout.
    #[serde(flatten)]
    pub common: CommonBackend,
    /// Base URL.
    pub address: Option<String>,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Index or index pattern to search.
    pub index: String,
    /// Query template, see [`crate::template`].
    pub query: String,
    /// Field mapping.
    pub fields: ElasticFields,
    /// Extra root certificate.
    pub ca_file: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
}

/// Kubernetes backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesConfig {
    /// Name, routes, labels and timeout.
    #[serde(flatten)]
    pub common: CommonBackend,
    /// API server URL; defaults to the in-cluster service.
    pub api_server: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// File holding the bearer token.
    pub token_file: Option<PathBuf>,
    /// CA bundle for the API server.
    pub ca_file: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub insecure_skip_tls_verify: bool,
    /// Namespace used when a query names none.
    pub namespace: Option<String>,
}

/// CloudWatch Logs backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudWatchConfig {
    /// Name, routes, labels and timeout.
    #[serde(flatten)]
    pub common: CommonBackend,
    /// AWS region, e.g. `eu-west-1`.
    pub region: String,
    /// Log group to query.
    pub log_group: String,
    /// Insights query; defaults to [`DEFAULT_CLOUDWATCH_QUERY`].
    pub query: Option<String>,
    /// Endpoint override, e.g. for a local emulator.
    pub endpoint: Option<String>,
    /// Access key; falls back to `AWS_ACCESS_KEY_ID`.
    pub access_key_id: Option<String>,
    /// Secret key; falls back to `AWS_SECRET_ACCESS_KEY`.
    pub secret_access_key: Option<String>,
    /// Session token; falls back to `AWS_SESSION_TOKEN`.
    pub session_token: Option<String>,
    /// Delay between result polls in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Number of result polls before giving up.
    pub max_poll_attempts: Option<u32>,
}

impl CloudWatchConfig {
    /// Delay between result polls.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis)
    }

    /// Number of result polls before giving up.
    #[must_use]
    pub fn max_poll_attempts(&self) -> u32 {
        self.max_poll_attempts
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS)
    }

    /// The Insights query to run.
    #[must_use]
    pub fn query(&self) -> &str {
        self.query
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(DEFAULT_CLOUDWATCH_QUERY)
    }
}
