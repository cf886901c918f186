//! # Reconciler
//!
//! Drives AnyApplications towards the state their status describes in this zone.
//!
//! The reconciler is the only component that reads the whole application and
//! decides; jobs only report. Decisions are pure (see [`crate::controller::fsm`]),
//! the reconciler performs the I/O around them.

mod backoff;
mod merge;
mod reconcile;
mod types;

pub use backoff::{BackoffState, FibonacciBackoff};
pub use merge::merge_status;
pub use reconcile::reconcile;
pub use types::{Reconciler, ReconcilerError};
