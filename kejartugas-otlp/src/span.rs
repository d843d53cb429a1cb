//! # Span export contract
//!
//! Defines the [SpanExporter] trait a batch processor drives, and the result
//! codes an exporter reports back through its callback.

use crate::model::SpanRecord;
use futures_util::future::BoxFuture;
use std::fmt::Debug;
use std::time::Duration;

/// Outcome code of an export call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExportResultCode {
    /// The batch was handed to the collector.
    Success,
    /// The batch could not be delivered.
    Failed,
}

/// The result an exporter reports for one batch.
#[derive(Debug)]
pub struct ExportResult {
    /// Outcome code.
    pub code: ExportResultCode,
    /// The cause, set only for [`ExportResultCode::Failed`].
    pub error: Option<ExportError>,
}

impl ExportResult {
    /// A successful result.
    pub fn success() -> Self {
        ExportResult {
            code: ExportResultCode::Success,
            error: None,
        }
    }

    /// A failed result carrying its cause.
    pub fn failed(error: ExportError) -> Self {
        ExportResult {
            code: ExportResultCode::Failed,
            error: Some(error),
        }
    }

    /// Whether the code is [`ExportResultCode::Success`].
    pub fn is_success(&self) -> bool {
        self.code == ExportResultCode::Success
    }
}

impl From<Result<(), ExportError>> for ExportResult {
    fn from(result: Result<(), ExportError>) -> Self {
        match result {
            Ok(()) => ExportResult::success(),
            Err(err) => ExportResult::failed(err),
        }
    }
}

/// Errors that can make an export fail.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ExportError {
    /// The HTTP client could not complete the request.
    #[error("transport error: {0}")]
    Transport(#[source] kejartugas_http::HttpError),

    /// The batch could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request could not be assembled.
    #[error("invalid request: {0}")]
    RequestBuild(#[from] http::Error),

    /// The collector answered with a non-success status. Only reported when
    /// status checks are enabled on the exporter.
    #[error("collector responded with status {status}")]
    HttpStatus {
        /// Response status code.
        status: u16,
    },

    /// The request did not complete within the configured timeout.
    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    /// No Tokio runtime was available to drive the request.
    #[error("no async runtime available to send the export request")]
    NoRuntime,

    /// Other failures, mostly from test exporters.
    #[error("{0}")]
    Other(String),
}

/// Receives the result of one [`SpanExporter::export`] call.
pub type ResultCallback = Box<dyn FnOnce(ExportResult) + Send + 'static>;

/// The interface a batch processor uses to hand finished spans to a backend.
///
/// Exporters never panic or return errors from [`SpanExporter::export`]; every
/// outcome is delivered through the callback, possibly after the call has
/// returned.
pub trait SpanExporter: Send + Sync + Debug {
    /// Export a batch of finished spans and report the outcome to `result_callback`.
    ///
    /// Each call is independent: there is no queueing and no ordering between
    /// concurrent calls. Any retry policy belongs to the caller.
    fn export(&self, batch: Vec<SpanRecord>, result_callback: ResultCallback);

    /// Shut the exporter down. Nothing is buffered, so the returned future is
    /// already complete.
    fn shutdown(&self) -> BoxFuture<'static, ()> {
        Box::pin(futures_util::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_from_ok() {
        let result = ExportResult::from(Ok(()));
        assert!(result.is_success());
        assert!(result.error.is_none());
    }

    #[test]
    fn result_from_err_keeps_cause() {
        let result = ExportResult::from(Err(ExportError::HttpStatus { status: 502 }));
        assert_eq!(result.code, ExportResultCode::Failed);
        assert!(matches!(
            result.error,
            Some(ExportError::HttpStatus { status: 502 })
        ));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            ExportError::HttpStatus { status: 500 }.to_string(),
            "collector responded with status 500"
        );
        assert_eq!(
            ExportError::Transport("connection refused".into()).to_string(),
            "transport error: connection refused"
        );
    }
}
