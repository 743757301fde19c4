//! Configuration errors.

use loghub_core::BackendKind;
use thiserror::Error;

/// Errors raised while reading configuration or constructing a backend.
///
/// Fatal to the backend being built, never to the process: the loader logs
/// the error and excludes the entry.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read config file '{path}': {reason}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        reason: String,
    },

    /// A configuration file is not valid YAML for the expected shape.
    #[error("invalid YAML: {0}")]
    Parse(String),

    /// A backend entry names no backend kind.
    #[error("backend entry must name one of elasticsearch, opensearch, cloudwatch, kubernetes, file")]
    NoKind,

    /// A backend entry names more than one backend kind.
    #[error("backend entry names several kinds: {}", .0.join(", "))]
    MultipleKinds(Vec<&'static str>),

    /// A required field is missing or empty.
    #[error("{kind}: '{field}' is required")]
    MissingField {
        /// Backend kind.
        kind: BackendKind,
        /// Field name as written in the configuration.
        field: &'static str,
    },

    /// Two fields that exclude each other are both set.
    #[error("{kind}: {reason}")]
    Conflict {
        /// Backend kind.
        kind: BackendKind,
        /// Description of the conflict.
        reason: String,
    },

    /// A field holds a value that cannot be used.
    #[error("{kind}: invalid '{field}': {reason}")]
    InvalidValue {
        /// Backend kind.
        kind: BackendKind,
        /// Field name as written in the configuration.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The HTTP client for a backend could not be built.
    #[error("{kind}: failed to build HTTP client: {reason}")]
    Client {
        /// Backend kind.
        kind: BackendKind,
        /// Underlying error.
        reason: String,
    },

    /// Startup verification of a backend failed.
    #[error("backend '{backend}' failed verification: {reason}")]
    Verification {
        /// Backend name.
        backend: String,
        /// Why the ping failed.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(kind: BackendKind, field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            kind,
            field,
            reason: reason.to_string(),
        }
    }

    pub(crate) const fn missing(kind: BackendKind, field: &'static str) -> Self {
        Self::MissingField { kind, field }
    }

    pub(crate) fn client(kind: BackendKind, reason: impl ToString) -> Self {
        Self::Client {
            kind,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
