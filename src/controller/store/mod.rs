//! # Application Store
//!
//! Read and conditionally write AnyApplication resources.
//!
//! Status writes are guarded by `metadata.resourceVersion`: a write based on a
//! stale read fails with [`StoreError::Conflict`] and must be retried from a
//! fresh read. The retry loop itself lives in the status updater.

mod kubernetes;
mod memory;

pub use kubernetes::KubeApplicationStore;
pub use memory::InMemoryApplicationStore;

use crate::crd::{AnyApplication, ApplicationId};
use async_trait::async_trait;
use std::fmt::Debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("conflict writing application {0}: resource version is stale")]
    Conflict(ApplicationId),
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),
    #[error("failed to serialize application: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[async_trait]
pub trait ApplicationStore: Send + Sync + Debug {
    /// Fetch the application, `None` if it no longer exists
    async fn get(&self, id: &ApplicationId) -> Result<Option<AnyApplication>, StoreError>;

    /// Write the status of `application`, conditional on its resource version
    ///
    /// Returns the stored object with its new resource version.
    async fn update_status(&self, application: &AnyApplication) -> Result<AnyApplication, StoreError>;

    /// Replace the finalizer list of the application
    async fn patch_finalizers(
        &self,
        id: &ApplicationId,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError>;
}
