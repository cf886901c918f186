//! In-process application store
//!
//! Behaves like the API server for the purposes of the status protocol: every
//! write bumps a global resource version and writes based on a stale version
//! are rejected. Conflicts can also be injected to exercise retry paths.

use super::{ApplicationStore, StoreError};
use crate::crd::{AnyApplication, ApplicationId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    applications: DashMap<ApplicationId, AnyApplication>,
    resource_version: AtomicU64,
    injected_conflicts: AtomicU32,
    status_writes: AtomicU64,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Create or overwrite an application, assigning a fresh resource version
    pub fn insert(&self, mut application: AnyApplication) -> AnyApplication {
        application.metadata.resource_version = Some(self.next_resource_version());
        self.applications
            .insert(application.application_id(), application.clone());
        application
    }

    pub fn remove(&self, id: &ApplicationId) -> Option<AnyApplication> {
        self.applications.remove(id).map(|(_, application)| application)
    }

    /// Current copy of the application
    pub fn snapshot(&self, id: &ApplicationId) -> Option<AnyApplication> {
        self.applications.get(id).map(|entry| entry.value().clone())
    }

    /// Reject the next `count` status writes with a conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Number of accepted status writes
    pub fn status_writes(&self) -> u64 {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn get(&self, id: &ApplicationId) -> Result<Option<AnyApplication>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn update_status(&self, application: &AnyApplication) -> Result<AnyApplication, StoreError> {
        let id = application.application_id();
        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(StoreError::Conflict(id));
        }

        let mut stored = self
            .applications
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if stored.metadata.resource_version != application.metadata.resource_version {
            return Err(StoreError::Conflict(id));
        }
        stored.status.clone_from(&application.status);
        stored.metadata.resource_version = Some(self.next_resource_version());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }

    async fn patch_finalizers(
        &self,
        id: &ApplicationId,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let released = {
            let mut stored = self
                .applications
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            stored.metadata.finalizers = (!finalizers.is_empty()).then_some(finalizers);
            stored.metadata.resource_version = Some(self.next_resource_version());
            stored.metadata.finalizers.is_none() && stored.is_being_deleted()
        };
        // the last finalizer of a deleted object releases it
        if released {
            self.applications.remove(id);
        }
        Ok(())
    }
}
