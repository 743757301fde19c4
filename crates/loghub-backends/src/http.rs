//! Shared plumbing for the HTTP-speaking backends.

use std::path::Path;
use std::time::Duration;

use loghub_core::{BackendError, BackendKind};
use serde::de::DeserializeOwned;

use crate::error::{ConfigError, Result};

/// Connect timeout for every backend client; request deadlines come from the
/// aggregator.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TLS settings for a backend client.
#[derive(Debug, Clone, Default)]
pub(crate) struct TlsOptions<'a> {
    pub ca_file: Option<&'a Path>,
    pub insecure_skip_verify: bool,
}

/// Builds a `reqwest` client for one backend.
pub(crate) fn build_client(kind: BackendKind, tls: &TlsOptions<'_>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("loghub/", env!("CARGO_PKG_VERSION")));

    if let Some(path) = tls.ca_file {
        let pem = std::fs::read(path)
            .map_err(|e| ConfigError::invalid(kind, "caFile", format!("{}: {e}", path.display())))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| ConfigError::invalid(kind, "caFile", e))?;
        builder = builder.add_root_certificate(cert);
    }
    if tls.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder.build().map_err(|e| ConfigError::client(kind, e))
}

/// Parses a base URL, dropping any trailing slash.
pub(crate) fn parse_base_url(kind: BackendKind, field: &'static str, raw: &str) -> Result<String> {
    let url = url::Url::parse(raw.trim()).map_err(|e| ConfigError::invalid(kind, field, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            kind,
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

pub(crate) fn request_error(err: &reqwest::Error) -> BackendError {
    BackendError::Request(err.to_string())
}

/// Fails on non-success statuses, keeping a prefix of the body for context.
pub(crate) async fn check_status(response: reqwest::Response) -> loghub_core::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(256).collect();
    Err(BackendError::Response(format!("HTTP {status}: {snippet}")))
}

/// Reads a JSON body from a successful response.
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> loghub_core::Result<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await.map_err(|e| request_error(&e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Reads a text body from a successful response.
pub(crate) async fn read_text(response: reqwest::Response) -> loghub_core::Result<String> {
    let response = check_status(response).await?;
    response.text().await.map_err(|e| request_error(&e))
}
