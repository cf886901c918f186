//! # Async Jobs
//!
//! Operations the state machines dispatch for an application in this zone.
//!
//! The set of jobs is closed: [`AsyncJob`] holds one variant per [`JobType`].
//! Each job owns a condition snapshot (its current observation), runs as an
//! independent task under a [`Cancellation`], and publishes every outcome
//! through the status updater. Jobs never mutate the application directly.

mod context;
mod deploy;
mod factory;
mod operation;
mod ownership;
mod placement;
mod registry;
mod relocation;
mod undeploy;

pub use context::{ticker, Cancellation, JobContext};
pub use deploy::DeployJob;
pub use factory::JobFactory;
pub use operation::OperationJob;
pub use ownership::OwnershipTransferJob;
pub use placement::PlacementJob;
pub use registry::JobRegistry;
pub use relocation::RelocationJob;
pub use undeploy::UndeployJob;

use crate::crd::{ApplicationId, Condition};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    Deploy,
    Undeploy,
    LocalOperation,
    LocalPlacement,
    Relocate,
    OwnershipTransfer,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "Deploy",
            Self::Undeploy => "Undeploy",
            Self::LocalOperation => "LocalOperation",
            Self::LocalPlacement => "LocalPlacement",
            Self::Relocate => "Relocate",
            Self::OwnershipTransfer => "OwnershipTransfer",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of one job run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    pub job_type: JobType,
    pub application_id: ApplicationId,
    pub uuid: Uuid,
}

impl JobId {
    pub fn new(job_type: JobType, application_id: ApplicationId) -> Self {
        Self {
            job_type,
            application_id,
            uuid: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.job_type, self.application_id, self.uuid)
    }
}

/// Current observation of a job, shared between its task and readers
#[derive(Debug)]
pub(crate) struct JobStatus {
    condition: Mutex<Condition>,
}

impl JobStatus {
    pub(crate) fn new(condition: Condition) -> Self {
        Self {
            condition: Mutex::new(condition),
        }
    }

    pub(crate) fn get(&self) -> Condition {
        match self.condition.lock() {
            Ok(condition) => condition.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set(&self, condition: Condition) {
        match self.condition.lock() {
            Ok(mut current) => *current = condition,
            Err(poisoned) => *poisoned.into_inner() = condition,
        }
    }
}

/// One running (or runnable) operation for an application
#[derive(Debug)]
pub enum AsyncJob {
    Deploy(DeployJob),
    Undeploy(UndeployJob),
    LocalOperation(OperationJob),
    LocalPlacement(PlacementJob),
    Relocate(RelocationJob),
    OwnershipTransfer(OwnershipTransferJob),
}

impl AsyncJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Deploy(job) => job.job_id(),
            Self::Undeploy(job) => job.job_id(),
            Self::LocalOperation(job) => job.job_id(),
            Self::LocalPlacement(job) => job.job_id(),
            Self::Relocate(job) => job.job_id(),
            Self::OwnershipTransfer(job) => job.job_id(),
        }
    }

    pub fn job_type(&self) -> JobType {
        self.job_id().job_type
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.job_id().application_id
    }

    /// Snapshot of the job's current condition
    pub fn status(&self) -> Condition {
        match self {
            Self::Deploy(job) => job.status(),
            Self::Undeploy(job) => job.status(),
            Self::LocalOperation(job) => job.status(),
            Self::LocalPlacement(job) => job.status(),
            Self::Relocate(job) => job.status(),
            Self::OwnershipTransfer(job) => job.status(),
        }
    }

    /// Run to completion or until `cancel` fires
    pub async fn run(&self, cancel: Cancellation) {
        match self {
            Self::Deploy(job) => job.run(cancel).await,
            Self::Undeploy(job) => job.run(cancel).await,
            Self::LocalOperation(job) => job.run(cancel).await,
            Self::LocalPlacement(job) => job.run(cancel).await,
            Self::Relocate(job) => job.run(cancel).await,
            Self::OwnershipTransfer(job) => job.run(cancel).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique_per_run() {
        let app = ApplicationId::new("default", "nginx");
        let first = JobId::new(JobType::Deploy, app.clone());
        let second = JobId::new(JobType::Deploy, app);
        assert_ne!(first, second);
        assert!(first.to_string().starts_with("Deploy/default/nginx/"));
    }
}
