//! # Sync
//!
//! Narrow contracts between jobs and the cluster: render an application's
//! source into manifests, apply them, delete them and report their health.
//!
//! Jobs only see the [`Applications`] trait. [`ClusterApplications`] is the
//! Kubernetes implementation, built on a [`ChartRenderer`].

mod bundle;
mod cluster;
mod health;
mod helm;

pub use bundle::ApplicationBundle;
pub use cluster::ClusterApplications;
pub use health::{is_worse, worst, HealthStatus};
pub use helm::{parse_manifests, ChartRenderer, HelmTemplateRenderer};

use crate::crd::{AnyApplication, ApplicationId};
use async_trait::async_trait;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("application {0} has no helm source")]
    NoSource(ApplicationId),
    #[error("failed to render chart {chart} {version}: {message}")]
    Render {
        chart: String,
        version: String,
        message: String,
    },
    #[error("invalid manifest: {0}")]
    Manifest(String),
    #[error("resource kind {0} is not served by the cluster")]
    UnknownKind(String),
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to run {command}: {source}")]
    Command {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Identity of a zone-local resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        } else {
            write!(f, "{}/{}/{}/{}", self.group, self.kind, self.namespace, self.name)
        }
    }
}

/// Outcome of applying a single resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResult {
    pub key: ResourceKey,
    pub synced: bool,
    pub message: String,
}

/// Outcome of one sync of an application version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub version: String,
    /// Every rendered resource exists in the zone
    pub deployed: bool,
    pub health: HealthStatus,
    pub resources: Vec<ResourceResult>,
}

/// Outcome of deleting the resources of one version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    pub version: String,
    pub total: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    /// Resources of this version are still present after the delete
    pub resources_present: bool,
}

impl DeleteResult {
    /// `Version V (Total=t, Deleted=d, DeleteFailed=f). ` for each result
    pub fn summary(results: &[DeleteResult]) -> String {
        results
            .iter()
            .map(|r| {
                format!(
                    "Version {} (Total={}, Deleted={}, DeleteFailed={}). ",
                    r.version, r.total, r.deleted, r.delete_failed
                )
            })
            .collect()
    }

    pub fn any_present(results: &[DeleteResult]) -> bool {
        results.iter().any(|r| r.resources_present)
    }
}

/// What the zone currently runs for an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalApplication {
    pub version: Option<String>,
    pub bundle: ApplicationBundle,
}

impl LocalApplication {
    pub fn is_present(&self) -> bool {
        self.bundle.is_present()
    }

    pub fn is_deployed(&self) -> bool {
        self.bundle.is_deployed()
    }

    pub fn health(&self) -> HealthStatus {
        self.bundle.determine_state()
    }
}

/// Operations jobs perform against the zone
#[async_trait]
pub trait Applications: Send + Sync + fmt::Debug {
    /// Render the target version and apply it
    async fn sync_version(&self, application: &AnyApplication) -> Result<SyncResult, SyncError>;

    /// Delete every present version of the application
    async fn cleanup(&self, application: &AnyApplication) -> Result<Vec<DeleteResult>, SyncError>;

    /// Versions with at least one resource in the zone
    async fn present_versions(&self, application: &AnyApplication) -> Result<Vec<String>, SyncError>;

    /// Health of the resources of the target version
    async fn aggregated_health(&self, application: &AnyApplication) -> Result<HealthStatus, SyncError>;

    /// Local view of the application, `None` when nothing of it exists in the zone
    async fn load_local_application(
        &self,
        application: &AnyApplication,
    ) -> Result<Option<LocalApplication>, SyncError>;
}
