//! Exporter configuration shared by the transports.
//!
//! Settings come from the builder first and fall back to the standard
//! `OTEL_EXPORTER_OTLP_*` environment variables.

use ::http::Uri;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub(crate) mod http;

/// Target to which the exporter is going to send spans, defaults to `http://localhost:4318`.
/// The traces path `/v1/traces` is appended to this value.
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Full URL spans are posted to. Used as is, without appending a path.
pub const OTEL_EXPORTER_OTLP_TRACES_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT";
/// Default collector address.
pub const OTEL_EXPORTER_OTLP_HTTP_ENDPOINT_DEFAULT: &str = "http://localhost:4318";
/// Key-value pairs to be used as headers on every export request.
/// Example: `k1=v1,k2=v2`
pub const OTEL_EXPORTER_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
/// Headers for trace export requests, preferred over [`OTEL_EXPORTER_OTLP_HEADERS`].
pub const OTEL_EXPORTER_OTLP_TRACES_HEADERS: &str = "OTEL_EXPORTER_OTLP_TRACES_HEADERS";
/// Max waiting time for the collector to accept a batch, in milliseconds. Unset means no timeout.
pub const OTEL_EXPORTER_OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
/// Timeout for trace export requests, preferred over [`OTEL_EXPORTER_OTLP_TIMEOUT`].
pub const OTEL_EXPORTER_OTLP_TRACES_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TRACES_TIMEOUT";

const TRACES_PATH: &str = "/v1/traces";

/// Configuration for the OTLP exporter.
#[derive(Debug, Default, Clone)]
pub struct ExportConfig {
    /// The URL spans are posted to. When unset the environment and then the
    /// default collector address are used.
    ///
    /// Note: Programmatically setting this will override any value set via the environment variable.
    pub endpoint: Option<String>,

    /// The timeout for a single export request. Unset means the request is
    /// never cut short by the exporter.
    ///
    /// Note: Programmatically setting this will override any value set via the environment variable.
    pub timeout: Option<Duration>,
}

#[derive(Error, Debug)]
/// Errors that can occur while building an exporter.
#[non_exhaustive]
pub enum ExporterBuildError {
    /// No Http client specified.
    #[error("no http client specified")]
    NoHttpClient,

    /// Invalid URI.
    #[error("invalid URI {0}. Reason {1}")]
    InvalidUri(String, String),
}

/// default user-agent headers
fn default_headers() -> HashMap<String, String> {
    let mut headers = HashMap::new();
    headers.insert(
        "User-Agent".to_string(),
        format!("KejarTugas-OTLP-Exporter/{}", env!("CARGO_PKG_VERSION")),
    );
    headers
}

fn build_endpoint_uri(endpoint: &str, path: &str) -> Result<Uri, ExporterBuildError> {
    let endpoint = endpoint.trim_end_matches('/');
    let uri = format!("{endpoint}{path}");
    uri.parse()
        .map_err(|e: ::http::uri::InvalidUri| ExporterBuildError::InvalidUri(uri, e.to_string()))
}

fn parse_uri(endpoint: &str) -> Result<Uri, ExporterBuildError> {
    endpoint
        .parse()
        .map_err(|e: ::http::uri::InvalidUri| {
            ExporterBuildError::InvalidUri(endpoint.to_string(), e.to_string())
        })
}

// see https://github.com/open-telemetry/opentelemetry-specification/blob/main/specification/protocol/exporter.md#endpoint-urls-for-otlphttp
fn resolve_endpoint(provided_endpoint: Option<&str>) -> Result<Uri, ExporterBuildError> {
    // programmatic configuration overrides any value set via environment variables
    if let Some(endpoint) = provided_endpoint.filter(|s| !s.is_empty()) {
        return parse_uri(endpoint);
    }

    // per signal env var is not modified
    if let Ok(endpoint) = std::env::var(OTEL_EXPORTER_OTLP_TRACES_ENDPOINT) {
        return parse_uri(&endpoint);
    }

    if let Ok(endpoint) = std::env::var(OTEL_EXPORTER_OTLP_ENDPOINT) {
        return build_endpoint_uri(&endpoint, TRACES_PATH);
    }

    build_endpoint_uri(OTEL_EXPORTER_OTLP_HTTP_ENDPOINT_DEFAULT, TRACES_PATH)
}

fn resolve_timeout(provided_timeout: Option<Duration>) -> Option<Duration> {
    provided_timeout.or_else(|| {
        std::env::var(OTEL_EXPORTER_OTLP_TRACES_TIMEOUT)
            .or_else(|_| std::env::var(OTEL_EXPORTER_OTLP_TIMEOUT))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .map(Duration::from_millis)
    })
}

fn env_headers() -> Option<String> {
    std::env::var(OTEL_EXPORTER_OTLP_TRACES_HEADERS)
        .or_else(|_| std::env::var(OTEL_EXPORTER_OTLP_HEADERS))
        .ok()
}

fn parse_header_string(value: &str) -> impl Iterator<Item = (&str, String)> {
    value
        .split_terminator(',')
        .map(str::trim)
        .filter_map(parse_header_key_value_string)
}

fn url_decode(value: &str) -> Option<String> {
    let mut decoded = Vec::with_capacity(value.len());
    let mut bytes = value.bytes();

    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hex = [bytes.next()?, bytes.next()?];
            let hex = std::str::from_utf8(&hex).ok()?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
        } else {
            decoded.push(b);
        }
    }

    String::from_utf8(decoded).ok()
}

fn parse_header_key_value_string(key_value_string: &str) -> Option<(&str, String)> {
    key_value_string
        .split_once('=')
        .map(|(key, value)| {
            (
                key.trim(),
                url_decode(value.trim()).unwrap_or(value.to_string()),
            )
        })
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
}
