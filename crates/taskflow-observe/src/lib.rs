//! Observability for taskflow: log formatting and optional span export.

pub mod tracing_setup;
