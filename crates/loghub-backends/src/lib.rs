//! # loghub-backends
//!
//! Log store adapters and their configuration.
//!
//! This crate provides:
//!
//! - [`GatewayConfig`]: the YAML backend list
//! - [`ElasticBackend`]: Elasticsearch and OpenSearch `_search`
//! - [`CloudWatchBackend`]: CloudWatch Logs Insights queries
//! - [`KubernetesBackend`]: pod container logs through the API server
//! - [`FileBackend`]: lines of local files
//! - [`load_backends`]: building (and optionally verifying) the whole list
//!
//! ## Example
//!
//! ```rust,no_run
//! use loghub_backends::{load_backends, GatewayConfig, LoadOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::from_file("/etc/loghub/backends.yaml")?;
//! let report = load_backends(config, &LoadOptions::default()).await;
//! for failure in &report.failures {
//!     eprintln!("entry {}: {}", failure.index, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cloudwatch;
pub mod config;
pub mod elastic;
pub mod error;
pub mod file;
mod http;
pub mod kubernetes;
pub mod loader;
pub mod sigv4;
pub mod template;

pub use cloudwatch::CloudWatchBackend;
pub use config::{
    BackendConfig, BackendEntry, CloudWatchConfig, ElasticFields, ElasticsearchConfig, FileConfig,
    GatewayConfig, KubernetesConfig, OpenSearchConfig,
};
pub use elastic::ElasticBackend;
pub use error::{ConfigError, Result};
pub use file::FileBackend;
pub use kubernetes::KubernetesBackend;
pub use loader::{build_backend, load_backends, LoadFailure, LoadOptions, LoadReport};
pub use template::{QueryTemplate, TemplateError};
