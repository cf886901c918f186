//! # Observability
//!
//! Prometheus metrics and optional OpenTelemetry tracing.

pub mod metrics;
pub mod otel;
