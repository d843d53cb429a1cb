//! Test helpers for code that exports spans.

use crate::model::SpanRecord;
use crate::span::{ExportError, ExportResult, ResultCallback, SpanExporter};
use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// An in-memory span exporter that stores every exported batch.
///
/// Clones share the same storage, so a test can keep one handle while a
/// processor owns another.
///
/// # Example
/// ```
/// # #[cfg(feature = "testing")]
/// # {
/// use kejartugas_otlp::model::SpanRecord;
/// use kejartugas_otlp::testing::InMemorySpanExporter;
/// use kejartugas_otlp::SpanExporter;
///
/// let exporter = InMemorySpanExporter::default();
/// let span = SpanRecord::builder("5b8efff798038103d269b633813fc60c", "00f067aa0ba902b7", "sync").build();
/// exporter.export(vec![span], Box::new(|result| assert!(result.is_success())));
///
/// assert_eq!(exporter.get_finished_spans().len(), 1);
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    batches: Arc<Mutex<Vec<Vec<SpanRecord>>>>,
    failing: Arc<AtomicBool>,
    shutdown_called: Arc<AtomicBool>,
}

impl InMemorySpanExporter {
    /// Make subsequent exports fail without storing their spans.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// All exported spans, in export order.
    pub fn get_finished_spans(&self) -> Vec<SpanRecord> {
        self.get_finished_batches().into_iter().flatten().collect()
    }

    /// All exported batches, in export order.
    pub fn get_finished_batches(&self) -> Vec<Vec<SpanRecord>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether [`SpanExporter::shutdown`] was called.
    pub fn is_shutdown_called(&self) -> bool {
        self.shutdown_called.load(Ordering::Relaxed)
    }

    /// Clears the internal storage of finished spans.
    pub fn reset(&self) {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&self, batch: Vec<SpanRecord>, result_callback: ResultCallback) {
        if self.failing.load(Ordering::Relaxed) {
            result_callback(ExportResult::failed(ExportError::Other(
                "forced failure".to_string(),
            )));
            return;
        }

        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
        result_callback(ExportResult::success());
    }

    fn shutdown(&self) -> BoxFuture<'static, ()> {
        self.shutdown_called.store(true, Ordering::Relaxed);
        Box::pin(futures_util::future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::ExportResultCode;

    fn span() -> SpanRecord {
        SpanRecord::builder("5b8efff798038103d269b633813fc60c", "00f067aa0ba902b7", "sync").build()
    }

    #[test]
    fn records_batches_and_resets() {
        let exporter = InMemorySpanExporter::default();
        let handle = exporter.clone();

        exporter.export(vec![span(), span()], Box::new(|r| assert!(r.is_success())));
        exporter.export(vec![span()], Box::new(|r| assert!(r.is_success())));

        assert_eq!(handle.get_finished_batches().len(), 2);
        assert_eq!(handle.get_finished_spans().len(), 3);

        handle.reset();
        assert!(exporter.get_finished_spans().is_empty());
    }

    #[test]
    fn forced_failure_is_reported() {
        let exporter = InMemorySpanExporter::default();
        exporter.set_failing(true);

        let (tx, rx) = std::sync::mpsc::channel();
        exporter.export(
            vec![span()],
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let result = rx.recv().unwrap();
        assert_eq!(result.code, ExportResultCode::Failed);
        assert!(matches!(result.error, Some(ExportError::Other(_))));
        assert!(exporter.get_finished_spans().is_empty());
    }
}
