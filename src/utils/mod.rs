//! Small shared utilities.

use thiserror::Error;
use url::Url;

/// Reasons an endpoint URL is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid URL: {0}")]
    Invalid(String),

    #[error("unsupported scheme '{0}': only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,
}

/// Validate a configured provider endpoint.
///
/// Endpoints come from operator configuration, not from clients, so this is
/// a sanity check rather than an SSRF guard: http(s) scheme, a host, and a
/// parseable URL.
pub fn validate_endpoint(raw: &str) -> Result<Url, EndpointError> {
    let url = Url::parse(raw).map_err(|e| EndpointError::Invalid(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(EndpointError::MissingHost);
    }

    Ok(url)
}
