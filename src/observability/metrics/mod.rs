//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliations, jobs and status writes

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
