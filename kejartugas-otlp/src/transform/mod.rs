//! Transformations from in-memory span records to the OTLP/JSON wire shape.
//!
//! Everything in here is pure: the same input always produces the same output.

/// Attribute and timestamp conversions shared by every signal shape.
pub mod common;

/// Span envelope conversions.
pub mod traces;
