//! AWS Signature Version 4 request signing.
//!
//! Only what the CloudWatch Logs JSON API needs: header-based signing of a
//! request whose body is fully buffered.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// AWS access credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl Credentials {
    /// Creates long-term credentials.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Adds a session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
    /// `AWS_SESSION_TOKEN` through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut credentials = Self::new(
            non_empty("AWS_ACCESS_KEY_ID")?,
            non_empty("AWS_SECRET_ACCESS_KEY")?,
        );
        credentials.session_token = non_empty("AWS_SESSION_TOKEN");
        Some(credentials)
    }

    /// Reads credentials from the process environment.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A buffered request to be signed.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    /// HTTP method.
    pub method: String,
    /// Full request URL.
    pub url: Url,
    /// Headers keyed by lowercase name.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl SignableRequest {
    /// Creates a request without headers.
    #[must_use]
    pub fn new(method: impl Into<String>, url: Url, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            url,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// Adds a header; the name is lowercased.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

/// Signs requests for one service in one region.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

impl Signer {
    /// Creates a signer.
    #[must_use]
    pub fn new(credentials: Credentials, region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Adds `host`, `x-amz-date`, the session token (if any) and
    /// `authorization` to `request`.
    pub fn sign(&self, request: &mut SignableRequest, now: DateTime<Utc>) {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        if let Some(host) = host_header(&request.url) {
            request.headers.insert("host".to_string(), host);
        }
        request.headers.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(token) = &self.credentials.session_token {
            request
                .headers
                .insert("x-amz-security-token".to_string(), token.clone());
        }
        request.headers.remove("authorization");

        let (canonical, signed_headers) = canonical_request(request);
        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );
        let key = signing_key(
            &self.credentials.secret_access_key,
            &date,
            &self.region,
            &self.service,
        );
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

        request.headers.insert(
            "authorization".to_string(),
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.credentials.access_key_id
            ),
        );
    }
}

fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Returns the canonical request and the signed header list.
fn canonical_request(request: &SignableRequest) -> (String, String) {
    // Non-S3 services sign the already-encoded path encoded once more.
    let path = request.url.path();
    let canonical_uri = if path.is_empty() {
        "/".to_string()
    } else {
        path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
    };

    let mut query: Vec<(String, String)> = request
        .url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    query.sort();
    let canonical_query = query
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut canonical_headers = String::new();
    for (name, value) in &request.headers {
        canonical_headers.push_str(name);
        canonical_headers.push(':');
        canonical_headers.push_str(&value.split_whitespace().collect::<Vec<_>>().join(" "));
        canonical_headers.push('\n');
    }
    let signed_headers = request.headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical = format!(
        "{}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{}",
        request.method.to_ascii_uppercase(),
        hex::encode(Sha256::digest(&request.body))
    );
    (canonical, signed_headers)
}

/// Derives the signing key for one day, region and service.
#[must_use]
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// RFC 3986 encoding of everything but unreserved characters.
fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    #[test]
    fn derives_published_signing_key() {
        let key = signing_key(SECRET, "20150830", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn signs_published_list_users_example() {
        let url = Url::parse("https://iam.amazonaws.com/?Action=ListUsers&Version=2010-05-08").unwrap();
        let mut request = SignableRequest::new("GET", url, Vec::new()).with_header(
            "Content-Type",
            "application/x-www-form-urlencoded; charset=utf-8",
        );

        Signer::new(Credentials::new("AKIDEXAMPLE", SECRET), "us-east-1", "iam")
            .sign(&mut request, example_time());

        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/iam/aws4_request, \
                 SignedHeaders=content-type;host;x-amz-date, \
                 Signature=5d672d79c15b13162d9279b0855cfba6789a8edb4c82c400e06b5924a6f2b5d7"
            )
        );
        assert_eq!(request.headers.get("host").map(String::as_str), Some("iam.amazonaws.com"));
        assert_eq!(request.headers.get("x-amz-date").map(String::as_str), Some("20150830T123600Z"));
    }

    #[test]
    fn session_token_is_signed() {
        let url = Url::parse("https://logs.eu-west-1.amazonaws.com/").unwrap();
        let mut request = SignableRequest::new("POST", url, b"{}".to_vec());
        let credentials = Credentials::new("AKID", SECRET).with_session_token("token");

        Signer::new(credentials, "eu-west-1", "logs").sign(&mut request, example_time());

        let auth = request.headers.get("authorization").unwrap();
        assert!(auth.contains("SignedHeaders=host;x-amz-date;x-amz-security-token"));
        assert!(auth.contains("/20150830/eu-west-1/logs/aws4_request"));
        assert_eq!(
            request.headers.get("x-amz-security-token").map(String::as_str),
            Some("token")
        );
    }

    #[test]
    fn explicit_port_is_part_of_host() {
        let url = Url::parse("http://localhost:4566/").unwrap();
        assert_eq!(host_header(&url).as_deref(), Some("localhost:4566"));
    }

    #[test]
    fn resigning_replaces_authorization() {
        let url = Url::parse("https://logs.us-east-1.amazonaws.com/").unwrap();
        let mut request = SignableRequest::new("POST", url, Vec::new());
        let signer = Signer::new(Credentials::new("AKID", SECRET), "us-east-1", "logs");

        signer.sign(&mut request, example_time());
        let first = request.headers.get("authorization").cloned();
        signer.sign(&mut request, example_time());

        assert_eq!(request.headers.get("authorization").cloned(), first);
    }

    #[test]
    fn encoded_path_is_encoded_again() {
        let url = Url::parse("https://example.amazonaws.com/a%20b/c").unwrap();
        let request = SignableRequest::new("GET", url, Vec::new());
        let (canonical, _) = canonical_request(&request);
        assert!(canonical.starts_with("GET\n/a%2520b/c\n"));
    }

    #[test]
    fn uri_encoding() {
        assert_eq!(uri_encode("a b/c~d"), "a%20b%2Fc~d");
        assert_eq!(uri_encode("ünï"), "%C3%BCn%C3%AF");
    }

    #[test]
    fn credentials_from_lookup() {
        let env = |key: &str| match key {
            "AWS_ACCESS_KEY_ID" => Some("AKID".to_string()),
            "AWS_SECRET_ACCESS_KEY" => Some("secret".to_string()),
            _ => None,
        };
        let credentials = Credentials::from_lookup(env).unwrap();
        assert_eq!(credentials.access_key_id, "AKID");
        assert_eq!(credentials.session_token, None);

        assert!(Credentials::from_lookup(|_| None).is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let credentials = Credentials::new("AKID", "very-secret").with_session_token("tok");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
