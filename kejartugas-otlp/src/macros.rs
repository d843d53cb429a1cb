//! Diagnostics emitted by the exporter and the batch processor.
//!
//! Each event has a dotted name such as `SpanExporter.ExportFailed` plus
//! `key = value` fields. With the `internal-logs` feature the events go to
//! `tracing` under the `kejartugas-otlp` target; without it the fields are
//! evaluated and discarded.

macro_rules! otel_event {
    ($level:ident, $name:expr, $($key:ident = $value:expr),+) => {{
        // fmt subscribers do not print the event name, so it is repeated as a field.
        #[cfg(feature = "internal-logs")]
        {
            ::tracing::$level!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name, $($key = $value),+);
        };

        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),+);
        };
    }};
}

macro_rules! otel_debug {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        otel_event!(debug, $name, $($key = $value),+)
    };
}

macro_rules! otel_warn {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        otel_event!(warn, $name, $($key = $value),+)
    };
}

macro_rules! otel_error {
    (name: $name:expr, $($key:ident = $value:expr),+ $(,)?) => {
        otel_event!(error, $name, $($key = $value),+)
    };
}
