//! # Status
//!
//! The single write path for application status. Jobs and the reconciler
//! describe a change as a mutation closure; the [`StatusUpdater`] applies it to a
//! fresh read under optimistic concurrency.

mod updater;

pub use updater::StatusUpdater;
