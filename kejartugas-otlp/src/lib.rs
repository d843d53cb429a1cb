//! The KejarTugas OTLP/JSON span exporter.
//!
//! Finished spans recorded by the KejarTugas web and mobile apps are encoded
//! as an OTLP `ExportTraceServiceRequest` in its protobuf-JSON form and posted
//! to a collector over HTTP.
//!
//! The crate has three layers:
//!
//! * [`model`] holds the span records handed over by the recording layer.
//! * [`transform`] turns a batch of records into the wire envelope.
//! * [`OtlpJsonSpanExporter`] sends one envelope per batch and reports the
//!   outcome through a callback. A [`BatchSpanProcessor`] can sit in front of
//!   it to buffer spans and export them on a schedule.
//!
//! ## Quickstart
//!
//! ```no_run
//! use kejartugas_otlp::{BatchConfig, BatchSpanProcessor, OtlpJsonSpanExporter};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Endpoint, headers and timeout can also come from the
//! // OTEL_EXPORTER_OTLP_* environment variables.
//! let exporter = OtlpJsonSpanExporter::builder()
//!     .with_endpoint("https://collector.kejartugas.test/v1/traces")
//!     .build()?;
//!
//! let processor = BatchSpanProcessor::new(exporter, BatchConfig::default())?;
//! // processor.on_end(span) for every finished span
//! processor.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate features
//!
//! * `reqwest-client` (default): use `reqwest` as the HTTP client.
//! * `internal-logs` (default): emit the exporter's own diagnostics through `tracing`.
//! * `testing`: expose [`testing::InMemorySpanExporter`].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
mod macros;

mod batch;
mod exporter;
pub mod model;
mod span;
#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;
pub mod transform;

pub use crate::batch::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    ProcessorError, OTEL_BSP_MAX_EXPORT_BATCH_SIZE, OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
    OTEL_BSP_MAX_QUEUE_SIZE, OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT, OTEL_BSP_SCHEDULE_DELAY,
    OTEL_BSP_SCHEDULE_DELAY_DEFAULT,
};
pub use crate::exporter::http::{OtlpJsonSpanExporter, SpanExporterBuilder};
pub use crate::exporter::{
    ExportConfig, ExporterBuildError, OTEL_EXPORTER_OTLP_ENDPOINT,
    OTEL_EXPORTER_OTLP_HEADERS, OTEL_EXPORTER_OTLP_HTTP_ENDPOINT_DEFAULT,
    OTEL_EXPORTER_OTLP_TIMEOUT, OTEL_EXPORTER_OTLP_TRACES_ENDPOINT,
    OTEL_EXPORTER_OTLP_TRACES_HEADERS, OTEL_EXPORTER_OTLP_TRACES_TIMEOUT,
};
pub use crate::span::{
    ExportError, ExportResult, ExportResultCode, ResultCallback, SpanExporter,
};

#[doc(no_inline)]
pub use kejartugas_http::{HttpClient, HttpError};
