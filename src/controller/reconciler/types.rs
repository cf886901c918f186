//! # Reconciler Types
//!
//! Shared reconciler context and its error type.

use super::backoff::BackoffState;
use crate::clock::Clock;
use crate::config::{ControllerConfig, SharedControllerConfig};
use crate::controller::events::EventSink;
use crate::controller::job::{JobFactory, JobRegistry};
use crate::controller::store::{ApplicationStore, StoreError};
use crate::controller::sync::{Applications, SyncError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error("status store error: {0}")]
    Store(#[from] StoreError),
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("finalizer error: {0}")]
    Finalizer(String),
}

/// Context shared by every reconciliation
#[derive(Debug)]
pub struct Reconciler {
    pub config: SharedControllerConfig,
    pub(crate) store: Arc<dyn ApplicationStore>,
    pub(crate) applications: Arc<dyn Applications>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) jobs: JobRegistry,
    /// Per-resource error backoff, keyed by `namespace/name`
    ///
    /// Owned by the error policy; a successful reconciliation resets the entry.
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl Reconciler {
    pub fn new(
        config: SharedControllerConfig,
        store: Arc<dyn ApplicationStore>,
        applications: Arc<dyn Applications>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            applications,
            events,
            clock,
            jobs: JobRegistry::new(),
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Registry of the jobs started by this reconciler
    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Cancel every running job, used on shutdown
    pub fn stop_all_jobs(&self) {
        self.jobs.stop_all();
    }

    pub(crate) fn job_factory(&self, config: &ControllerConfig) -> JobFactory {
        JobFactory::new(
            Arc::clone(&self.store),
            Arc::clone(&self.events),
            Arc::clone(&self.applications),
            Arc::clone(&self.clock),
            config.runtime.clone(),
            config.status_update_retries,
        )
    }

    pub(crate) fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
