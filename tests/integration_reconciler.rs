//! Reconciler integration tests
//!
//! Drive the reconciler and its jobs against an in-memory store and a scripted
//! zone, without a Kubernetes API server.

#[path = "integration/reconciler/mod.rs"]
mod reconciler;
