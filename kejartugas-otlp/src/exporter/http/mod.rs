use super::{
    default_headers, env_headers, parse_header_string, resolve_endpoint, resolve_timeout,
    ExportConfig, ExporterBuildError,
};
use http::{HeaderName, HeaderValue, Uri};
use kejartugas_http::HttpClient;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

mod trace;

/// Configuration of the http transport
#[derive(Debug)]
#[cfg_attr(not(feature = "reqwest-client"), derive(Default))]
pub(crate) struct HttpConfig {
    /// Select the HTTP client
    client: Option<Arc<dyn HttpClient>>,

    /// Additional headers to send to the collector.
    headers: Option<HashMap<String, String>>,
}

#[cfg(feature = "reqwest-client")]
impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            client: Some(Arc::new(reqwest::Client::new())),
            headers: None,
        }
    }
}

/// Builder for [`OtlpJsonSpanExporter`].
///
/// ## Examples
///
/// ```no_run
/// use kejartugas_otlp::OtlpJsonSpanExporter;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let exporter = OtlpJsonSpanExporter::builder()
///     .with_endpoint("https://collector.kejartugas.test/v1/traces")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SpanExporterBuilder {
    pub(crate) exporter_config: ExportConfig,
    pub(crate) http_config: HttpConfig,
    status_check: bool,
    runtime: Option<Handle>,
}

impl Default for SpanExporterBuilder {
    fn default() -> Self {
        SpanExporterBuilder {
            exporter_config: ExportConfig::default(),
            http_config: HttpConfig {
                headers: Some(default_headers()),
                ..HttpConfig::default()
            },
            status_check: false,
            runtime: None,
        }
    }
}

impl SpanExporterBuilder {
    /// Set the URL spans are posted to.
    ///
    /// Note: Programmatically setting this will override any value set via the environment variable.
    pub fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.exporter_config.endpoint = Some(endpoint.into());
        self
    }

    /// Set a timeout for each export request.
    ///
    /// Note: Programmatically setting this will override any value set via the environment variable.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.exporter_config.timeout = Some(timeout);
        self
    }

    /// Set export config. This will override all previous configurations.
    pub fn with_export_config(mut self, exporter_config: ExportConfig) -> Self {
        self.exporter_config = exporter_config;
        self
    }

    /// Assign client implementation
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.http_config.client = Some(Arc::new(client));
        self
    }

    /// Set additional headers to send to the collector.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        // headers will be wrapped, so we must do some logic to unwrap first.
        let mut inst_headers = self.http_config.headers.unwrap_or_default();
        inst_headers.extend(
            headers
                .into_iter()
                .map(|(key, value)| (key, super::url_decode(&value).unwrap_or(value))),
        );
        self.http_config.headers = Some(inst_headers);
        self
    }

    /// Treat responses with a non-2xx status as failed exports.
    ///
    /// Off by default: any response the collector sends back, whatever its
    /// status, counts as a delivered batch.
    pub fn with_status_check(mut self, enabled: bool) -> Self {
        self.status_check = enabled;
        self
    }

    /// Run export requests on this runtime instead of the one current at export time.
    pub fn with_runtime_handle(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Create a span exporter with the current configuration.
    pub fn build(mut self) -> Result<OtlpJsonSpanExporter, ExporterBuildError> {
        let collector_endpoint = resolve_endpoint(self.exporter_config.endpoint.as_deref())?;
        let timeout = resolve_timeout(self.exporter_config.timeout);

        let client = self
            .http_config
            .client
            .take()
            .ok_or(ExporterBuildError::NoHttpClient)?;

        #[allow(clippy::mutable_key_type)] // http headers are not mutated
        let mut headers: HashMap<HeaderName, HeaderValue> = HashMap::new();
        add_headers(
            self.http_config
                .headers
                .take()
                .unwrap_or_default()
                .iter()
                .map(|(k, v)| (k.as_str(), v.clone())),
            &mut headers,
        );

        // read headers from env var - signal specific env var is preferred over general
        if let Some(input) = env_headers() {
            add_headers(parse_header_string(&input), &mut headers);
        }

        otel_debug!(
            name: "SpanExporterBuilt",
            endpoint = collector_endpoint.to_string(),
            status_check = self.status_check
        );

        Ok(OtlpJsonSpanExporter {
            client,
            collector_endpoint,
            headers,
            timeout,
            status_check: self.status_check,
            runtime: self.runtime,
        })
    }
}

#[allow(clippy::mutable_key_type)] // http headers are not mutated
fn add_headers<'a>(
    input: impl Iterator<Item = (&'a str, String)>,
    headers: &mut HashMap<HeaderName, HeaderValue>,
) {
    headers.extend(input.filter_map(|(key, value)| {
        Some((
            HeaderName::from_str(key).ok()?,
            HeaderValue::from_str(&value).ok()?,
        ))
    }));
}

/// Sends span batches as OTLP/JSON over HTTP.
///
/// The exporter holds only configuration, so it can be shared freely and
/// export calls may overlap.
#[derive(Debug, Clone)]
pub struct OtlpJsonSpanExporter {
    client: Arc<dyn HttpClient>,
    collector_endpoint: Uri,
    headers: HashMap<HeaderName, HeaderValue>,
    timeout: Option<Duration>,
    status_check: bool,
    runtime: Option<Handle>,
}

impl OtlpJsonSpanExporter {
    /// Configure a new exporter.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }

    /// The URL batches are posted to.
    pub fn endpoint(&self) -> &Uri {
        &self.collector_endpoint
    }
}
