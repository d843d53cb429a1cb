use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{header::CONTENT_TYPE, HeaderValue, Method, Request};
use kejartugas_http::{HttpClient, ResponseExt};
use std::panic::AssertUnwindSafe;
use tokio::runtime::Handle;

use super::OtlpJsonSpanExporter;
use crate::model::SpanRecord;
use crate::span::{ExportError, ExportResult, ResultCallback, SpanExporter};
use crate::transform::traces::build_resource_spans;

impl OtlpJsonSpanExporter {
    fn build_trace_export_request(&self, batch: &[SpanRecord]) -> Result<Request<Bytes>, ExportError> {
        let body = build_resource_spans(batch).to_json()?;

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(self.collector_endpoint.clone())
            .body(Bytes::from(body))?;

        for (k, v) in &self.headers {
            request.headers_mut().insert(k.clone(), v.clone());
        }
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(request)
    }

    /// Export a batch and resolve to its result.
    ///
    /// The payload is built before this returns; the returned future only
    /// performs the request. It never resolves to a panic or an `Err`, failures
    /// are carried by the [`ExportResult`].
    pub fn export_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'static, ExportResult> {
        let span_count = batch.len();
        let request = match self.build_trace_export_request(&batch) {
            Ok(request) => request,
            Err(err) => {
                otel_debug!(
                    name: "SpanExporter.BuildRequestFailed",
                    reason = err.to_string()
                );
                return Box::pin(futures_util::future::ready(ExportResult::failed(err)));
            }
        };

        let client = Arc::clone(&self.client);
        let timeout = self.timeout;
        let status_check = self.status_check;

        Box::pin(async move {
            let result = send(client, request, timeout, status_check).await;
            match &result {
                Ok(()) => {
                    otel_debug!(name: "SpanExporter.Exported", span_count = span_count);
                }
                Err(err) => {
                    otel_debug!(
                        name: "SpanExporter.ExportFailed",
                        span_count = span_count,
                        reason = err.to_string()
                    );
                }
            }
            result.into()
        })
    }

    fn runtime_handle(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }
}

async fn send(
    client: Arc<dyn HttpClient>,
    request: Request<Bytes>,
    timeout: Option<Duration>,
    status_check: bool,
) -> Result<(), ExportError> {
    let request_uri = request.uri().to_string();
    let response = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, client.send_bytes(request))
            .await
            .map_err(|_| ExportError::Timeout(timeout))?,
        None => client.send_bytes(request).await,
    }
    .map_err(ExportError::Transport)?;

    let status = response.status().as_u16();
    if status_check {
        response
            .error_for_status()
            .map_err(|_| ExportError::HttpStatus { status })?;
    } else if !response.status().is_success() {
        // The collector's verdict is not part of the export result.
        otel_debug!(
            name: "SpanExporter.NonSuccessStatusIgnored",
            url = request_uri,
            status = status
        );
    }

    Ok(())
}

impl SpanExporter for OtlpJsonSpanExporter {
    fn export(&self, batch: Vec<SpanRecord>, result_callback: ResultCallback) {
        let Some(handle) = self.runtime_handle() else {
            otel_warn!(
                name: "SpanExporter.NoRuntime",
                message = "No Tokio runtime available, dropping span batch"
            );
            result_callback(ExportResult::failed(ExportError::NoRuntime));
            return;
        };

        let export = AssertUnwindSafe(self.export_batch(batch)).catch_unwind();
        // The task handle is not awaited: the callback is the only result channel.
        drop(handle.spawn(async move {
            let result = export.await.unwrap_or_else(|_| {
                otel_error!(
                    name: "SpanExporter.ExportPanicked",
                    message = "HTTP client panicked while sending a span batch"
                );
                ExportResult::failed(ExportError::Other(
                    "HTTP client panicked while sending the batch".to_string(),
                ))
            });
            result_callback(result);
        }));
    }
}
