//! AnyApplication Controller Library
//!
//! Core of the AnyApplication controller: the resource model, the per-zone
//! condition store, the global and local state machines, the async job engine
//! and the reconciler that ties them together.
//! Unit tests live next to the code; scenario tests live under `tests/`.

pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod server;

// Re-export CRD types for convenience
pub use crd::*;
