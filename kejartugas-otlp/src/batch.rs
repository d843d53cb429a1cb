//! # Batch span processor
//!
//! Buffers finished spans on a bounded queue and hands them to a
//! [`SpanExporter`] in batches, either when a batch fills up or when the
//! scheduled delay elapses.
//!
//! The worker runs as a Tokio task. Exports are driven one at a time and a
//! failed export is logged and dropped; retrying is left to the caller.

use crate::model::SpanRecord;
use crate::span::{ExportError, SpanExporter};
use std::cmp::min;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

/// Delay interval between two consecutive exports, in milliseconds.
pub const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
pub const OTEL_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 500;
/// Maximum queue size.
pub const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub const OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to OTEL_BSP_MAX_QUEUE_SIZE.
pub const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
pub const OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;

/// Errors returned by [`BatchSpanProcessor`] operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProcessorError {
    /// The processor was already shut down.
    #[error("batch span processor is already shut down")]
    AlreadyShutdown,

    /// No Tokio runtime was available to run the worker.
    #[error("no Tokio runtime available to run the batch worker")]
    NoRuntime,

    /// The exporter reported a failure for one of the flushed batches.
    #[error("export failed: {0}")]
    ExportFailed(#[source] ExportError),

    /// The worker went away before answering.
    #[error("internal failure: {0}")]
    InternalFailure(String),
}

/// Batch span processor configuration.
/// Use [`BatchConfigBuilder`] to configure your own instance of [`BatchConfig`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// The maximum queue size to buffer spans for delayed processing. If the
    /// queue gets full it drops the spans.
    pub(crate) max_queue_size: usize,

    /// The delay interval between two consecutive processing of batches.
    pub(crate) scheduled_delay: Duration,

    /// The maximum number of spans to process in a single batch. If there are
    /// more than one batch worth of spans then it processes multiple batches
    /// of spans one batch after the other without any delay.
    pub(crate) max_export_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

impl BatchConfig {
    /// Maximum number of spans waiting in the queue.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Interval between scheduled exports.
    pub fn scheduled_delay(&self) -> Duration {
        self.scheduled_delay
    }

    /// Maximum number of spans in one exported batch.
    pub fn max_export_batch_size(&self) -> usize {
        self.max_export_batch_size
    }
}

/// A builder for creating [`BatchConfig`] instances.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
}

impl Default for BatchConfigBuilder {
    /// Create a new [`BatchConfigBuilder`] initialized with the default batch config values.
    /// The values are overridden by environment variables if set.
    /// The supported environment variables are:
    /// * `OTEL_BSP_MAX_QUEUE_SIZE`
    /// * `OTEL_BSP_SCHEDULE_DELAY`
    /// * `OTEL_BSP_MAX_EXPORT_BATCH_SIZE`
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: Duration::from_millis(OTEL_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set max_queue_size for [`BatchConfigBuilder`].
    /// It's the maximum queue size to buffer spans for delayed processing.
    /// If the queue gets full it will drop the spans.
    /// The default value is 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set max_export_batch_size for [`BatchConfigBuilder`].
    /// The default value is 512.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set scheduled_delay for [`BatchConfigBuilder`].
    /// The default value is 500 milliseconds.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Builds a `BatchConfig` enforcing the following invariants:
    /// * `max_export_batch_size` must be less than or equal to `max_queue_size`.
    /// * sizes and the delay are never zero.
    pub fn build(self) -> BatchConfig {
        let max_queue_size = self.max_queue_size.max(1);
        // we set max export batch size to max queue size if it's larger than max queue size.
        let max_export_batch_size = min(self.max_export_batch_size.max(1), max_queue_size);
        let scheduled_delay = if self.scheduled_delay.is_zero() {
            Duration::from_millis(1)
        } else {
            self.scheduled_delay
        };

        BatchConfig {
            max_queue_size,
            scheduled_delay,
            max_export_batch_size,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = env::var(OTEL_BSP_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| usize::from_str(queue_size.trim()).ok())
        {
            self.max_queue_size = max_queue_size;
        }

        if let Some(scheduled_delay) = env::var(OTEL_BSP_SCHEDULE_DELAY)
            .ok()
            .and_then(|delay| u64::from_str(delay.trim()).ok())
        {
            self.scheduled_delay = Duration::from_millis(scheduled_delay);
        }

        if let Some(max_export_batch_size) = env::var(OTEL_BSP_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| usize::from_str(batch_size.trim()).ok())
        {
            self.max_export_batch_size = max_export_batch_size;
        }

        self
    }
}

/// Messages sent between the application and the batch worker.
#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
enum BatchMessage {
    /// A span has finished and waits for export.
    ExportSpan(SpanRecord),
    /// Export everything buffered so far.
    Flush(oneshot::Sender<Result<(), ProcessorError>>),
    /// Export everything buffered, shut the exporter down and stop.
    Shutdown(oneshot::Sender<Result<(), ProcessorError>>),
}

/// A span processor that buffers finished spans and exports them in batches.
///
/// ```no_run
/// use kejartugas_otlp::{BatchConfigBuilder, BatchSpanProcessor, OtlpJsonSpanExporter};
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let exporter = OtlpJsonSpanExporter::builder()
///     .with_endpoint("https://collector.kejartugas.test/v1/traces")
///     .build()?;
/// let processor = BatchSpanProcessor::builder(exporter)
///     .with_batch_config(
///         BatchConfigBuilder::default()
///             .with_scheduled_delay(Duration::from_millis(500))
///             .build(),
///     )
///     .build()?;
///
/// // ... processor.on_end(span) for every finished span ...
///
/// processor.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct BatchSpanProcessor {
    message_sender: mpsc::Sender<BatchMessage>,

    // Track dropped spans
    dropped_spans_count: AtomicUsize,

    max_queue_size: usize,

    is_shutdown: AtomicBool,
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("max_queue_size", &self.max_queue_size)
            .field("dropped_spans", &self.dropped_spans())
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl BatchSpanProcessor {
    /// Create a processor on the current Tokio runtime.
    ///
    /// Fails with [`ProcessorError::NoRuntime`] when called outside a runtime.
    pub fn new<E>(exporter: E, config: BatchConfig) -> Result<Self, ProcessorError>
    where
        E: SpanExporter + 'static,
    {
        Self::builder(exporter).with_batch_config(config).build()
    }

    /// Create a new batch processor builder.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
            runtime: None,
        }
    }

    /// Queue a finished span for export.
    ///
    /// Never blocks. When the queue is full the span is dropped and counted.
    /// After shutdown this does nothing.
    pub fn on_end(&self, span: SpanRecord) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }

        let result = self.message_sender.try_send(BatchMessage::ExportSpan(span));

        // If the queue is full, and we can't buffer a span
        if result.is_err() {
            // Increment the number of dropped spans. If this is the first time we've had to drop,
            // emit a warning.
            if self.dropped_spans_count.fetch_add(1, Ordering::Relaxed) == 0 {
                otel_warn!(name: "BatchSpanProcessor.SpanDroppingStarted",
                    message = "Beginning to drop span messages due to full/internal errors. No further log will be emitted for further drops until Shutdown. During Shutdown time, a log will be emitted with exact count of total spans dropped.");
            }
        }
    }

    /// Export every span queued so far and wait for the result.
    pub async fn force_flush(&self) -> Result<(), ProcessorError> {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(ProcessorError::AlreadyShutdown);
        }

        let (res_sender, res_receiver) = oneshot::channel();
        self.message_sender
            .send(BatchMessage::Flush(res_sender))
            .await
            .map_err(|_| ProcessorError::AlreadyShutdown)?;

        res_receiver.await.map_err(|err| {
            ProcessorError::InternalFailure(format!("Flush response channel error: {err}"))
        })?
    }

    /// Flush the queue, shut the exporter down and stop the worker.
    pub async fn shutdown(&self) -> Result<(), ProcessorError> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ProcessorError::AlreadyShutdown);
        }

        let dropped_spans = self.dropped_spans();
        let max_queue_size = self.max_queue_size;
        if dropped_spans > 0 {
            otel_warn!(
                name: "BatchSpanProcessor.Shutdown",
                dropped_spans = dropped_spans,
                max_queue_size = max_queue_size,
                message = "Spans were dropped due to a full or closed queue. The count represents the total count of span records dropped in the lifetime of the BatchSpanProcessor. Consider increasing the queue size and/or decrease delay between intervals."
            );
        }

        let (res_sender, res_receiver) = oneshot::channel();
        self.message_sender
            .send(BatchMessage::Shutdown(res_sender))
            .await
            .map_err(|err| {
                ProcessorError::InternalFailure(format!("Failed to send shutdown message: {err}"))
            })?;

        res_receiver.await.map_err(|err| {
            ProcessorError::InternalFailure(format!("Shutdown response channel error: {err}"))
        })?
    }

    /// Number of spans dropped because the queue was full.
    pub fn dropped_spans(&self) -> usize {
        self.dropped_spans_count.load(Ordering::Relaxed)
    }
}

/// A builder for creating [`BatchSpanProcessor`] instances.
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
    runtime: Option<Handle>,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the BatchConfig for [`BatchSpanProcessorBuilder`]
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Run the worker on this runtime instead of the current one.
    pub fn with_runtime_handle(self, handle: Handle) -> Self {
        BatchSpanProcessorBuilder {
            runtime: Some(handle),
            ..self
        }
    }

    /// Build a batch processor and spawn its worker.
    pub fn build(self) -> Result<BatchSpanProcessor, ProcessorError> {
        let handle = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ProcessorError::NoRuntime)?,
        };

        let (message_sender, message_receiver) = mpsc::channel(self.config.max_queue_size);
        let max_queue_size = self.config.max_queue_size;

        let worker = BatchSpanProcessorInternal {
            spans: Vec::with_capacity(self.config.max_export_batch_size),
            exporter: Arc::new(self.exporter),
            config: self.config,
        };
        drop(handle.spawn(worker.run(message_receiver)));

        Ok(BatchSpanProcessor {
            message_sender,
            dropped_spans_count: AtomicUsize::new(0),
            max_queue_size,
            is_shutdown: AtomicBool::new(false),
        })
    }
}

struct BatchSpanProcessorInternal<E> {
    spans: Vec<SpanRecord>,
    exporter: Arc<E>,
    config: BatchConfig,
}

impl<E: SpanExporter + 'static> BatchSpanProcessorInternal<E> {
    async fn run(mut self, mut messages: mpsc::Receiver<BatchMessage>) {
        let delay = self.config.scheduled_delay;
        // The first tick fires one full delay after start.
        let mut ticker = time::interval_at(Instant::now() + delay, delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.flush().await {
                        otel_error!(
                            name: "BatchSpanProcessor.Flush.ExportError",
                            reason = err.to_string(),
                            message = "Failed during the export process"
                        );
                    }
                }
                message = messages.recv() => match message {
                    Some(BatchMessage::ExportSpan(span)) => {
                        self.spans.push(span);
                        if self.spans.len() >= self.config.max_export_batch_size {
                            let batch = self.spans.split_off(0);
                            if let Err(err) = export(&self.exporter, batch).await {
                                otel_error!(
                                    name: "BatchSpanProcessor.Export.Error",
                                    reason = err.to_string()
                                );
                            }
                            ticker.reset();
                        }
                    }
                    Some(BatchMessage::Flush(res_channel)) => {
                        let result = self.flush().await;
                        if let Err(result) = res_channel.send(result) {
                            otel_debug!(
                                name: "BatchSpanProcessor.Flush.SendResultError",
                                reason = format!("{result:?}")
                            );
                        }
                    }
                    Some(BatchMessage::Shutdown(res_channel)) => {
                        let result = self.flush().await;
                        self.exporter.shutdown().await;
                        messages.close();
                        let _ = res_channel.send(result);
                        otel_debug!(name: "BatchSpanProcessor.ThreadExiting", reason = "ShutdownRequested");
                        break;
                    }
                    None => {
                        otel_debug!(name: "BatchSpanProcessor.ThreadExiting", reason = "ProcessorDropped");
                        break;
                    }
                },
            }
        }
    }

    async fn flush(&mut self) -> Result<(), ProcessorError> {
        let mut result = Ok(());
        while !self.spans.is_empty() {
            let rest = self
                .spans
                .split_off(min(self.config.max_export_batch_size, self.spans.len()));
            let batch = std::mem::replace(&mut self.spans, rest);
            if let Err(err) = export(&self.exporter, batch).await {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

async fn export<E: SpanExporter>(
    exporter: &Arc<E>,
    batch: Vec<SpanRecord>,
) -> Result<(), ProcessorError> {
    // Flush and shutdown may be called when there's no work to do.
    if batch.is_empty() {
        return Ok(());
    }

    let (tx, rx) = oneshot::channel();
    exporter.export(
        batch,
        Box::new(move |result| {
            let _ = tx.send(result);
        }),
    );

    let result = rx.await.map_err(|_| {
        ProcessorError::InternalFailure("exporter dropped the result callback".to_string())
    })?;
    if result.is_success() {
        Ok(())
    } else {
        Err(ProcessorError::ExportFailed(result.error.unwrap_or_else(|| {
            ExportError::Other("export failed without a cause".to_string())
        })))
    }
}
