//! Turns configuration into live backends.
//!
//! Each entry is built independently. An entry that fails to build (or,
//! with verification on, fails its ping) is logged and left out; the rest
//! of the list is unaffected.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use loghub_core::{SharedBackend, DEFAULT_BACKEND_TIMEOUT};
use tracing::{error, info, warn};

use crate::cloudwatch::CloudWatchBackend;
use crate::config::{BackendConfig, GatewayConfig};
use crate::elastic::ElasticBackend;
use crate::error::{ConfigError, Result};
use crate::file::FileBackend;
use crate::kubernetes::KubernetesBackend;

/// How [`load_backends`] builds the list.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Ping every backend and drop the ones that fail.
    pub verify: bool,
    /// Ping deadline for backends without their own timeout.
    pub default_timeout: Duration,
    /// Directory relative file patterns resolve against; the working
    /// directory when unset.
    pub base_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            verify: false,
            default_timeout: DEFAULT_BACKEND_TIMEOUT,
            base_dir: None,
        }
    }
}

impl LoadOptions {
    /// Enables startup verification.
    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Sets the ping deadline for backends without their own timeout.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Resolves relative file patterns against `dir`.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

/// An entry that was left out.
#[derive(Debug)]
pub struct LoadFailure {
    /// Position of the entry in the configuration.
    pub index: usize,
    /// Why it was left out.
    pub error: ConfigError,
}

/// The outcome of [`load_backends`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Backends in configuration order.
    pub backends: Vec<SharedBackend>,
    /// Entries that were left out.
    pub failures: Vec<LoadFailure>,
}

impl LoadReport {
    /// True when every entry loaded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds the backend for one validated entry.
///
/// `index` is the entry's position, used for the default name.
///
/// # Errors
///
/// Returns the adapter's construction error.
pub fn build_backend(config: BackendConfig, index: usize, base_dir: Option<&Path>) -> Result<SharedBackend> {
    let backend: SharedBackend = match config {
        BackendConfig::Elasticsearch(c) => Arc::new(ElasticBackend::elasticsearch(c, index)?),
        BackendConfig::OpenSearch(c) => Arc::new(ElasticBackend::opensearch(c, index)?),
        BackendConfig::CloudWatch(c) => Arc::new(CloudWatchBackend::from_config(c, index)?),
        BackendConfig::Kubernetes(c) => Arc::new(KubernetesBackend::from_config(c, index)?),
        BackendConfig::File(c) => match base_dir {
            Some(base) => Arc::new(FileBackend::with_base_dir(c, index, base)?),
            None => Arc::new(FileBackend::from_config(c, index)?),
        },
    };
    Ok(backend)
}

/// Builds every configured backend, optionally verifying each one.
pub async fn load_backends(config: GatewayConfig, options: &LoadOptions) -> LoadReport {
    let mut report = LoadReport::default();
    let mut built = Vec::new();

    for (index, entry) in config.backends.into_iter().enumerate() {
        match entry
            .into_config()
            .and_then(|c| build_backend(c, index, options.base_dir.as_deref()))
        {
            Ok(backend) => built.push((index, backend)),
            Err(e) => {
                error!(index, error = %e, "backend configuration rejected");
                report.failures.push(LoadFailure { index, error: e });
            }
        }
    }

    if options.verify {
        let (kept, failed) = verify_backends(built, options.default_timeout).await;
        built = kept;
        report.failures.extend(failed);
        report.failures.sort_by_key(|f| f.index);
    }

    report.backends = built.into_iter().map(|(_, backend)| backend).collect();
    info!(
        loaded = report.backends.len(),
        rejected = report.failures.len(),
        "backends loaded"
    );
    report
}

/// Pings every backend concurrently under its timeout.
async fn verify_backends(
    backends: Vec<(usize, SharedBackend)>,
    default_timeout: Duration,
) -> (Vec<(usize, SharedBackend)>, Vec<LoadFailure>) {
    let pings = backends.iter().map(|(_, backend)| {
        let deadline = backend.timeout().unwrap_or(default_timeout);
        async move {
            match tokio::time::timeout(deadline, backend.ping()).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("no answer within {}s", deadline.as_secs_f64())),
            }
        }
    });
    let outcomes = join_all(pings).await;

    let mut kept = Vec::new();
    let mut failed = Vec::new();
    for ((index, backend), outcome) in backends.into_iter().zip(outcomes) {
        match outcome {
            Ok(()) => kept.push((index, backend)),
            Err(reason) => {
                warn!(index, backend = backend.name(), kind = %backend.kind(), %reason, "backend failed verification");
                failed.push(LoadFailure {
                    index,
                    error: ConfigError::Verification {
                        backend: backend.name().to_string(),
                        reason,
                    },
                });
            }
        }
    }
    (kept, failed)
}
