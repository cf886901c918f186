//! # Relocate Job
//!
//! Pulls the application into this zone during an ownership change.
//! One sync attempt, reported as the zone's `Relocation` condition.

use super::{Cancellation, JobContext, JobId, JobStatus, JobType};
use crate::crd::{AnyApplication, Condition, ConditionType, RelocationStatus};
use tracing::{info, warn};

#[derive(Debug)]
pub struct RelocationJob {
    id: JobId,
    application: AnyApplication,
    context: JobContext,
    status: JobStatus,
}

impl RelocationJob {
    pub fn new(application: AnyApplication, context: JobContext) -> Self {
        let initial = context.condition(ConditionType::Relocation, RelocationStatus::Pull.as_str());
        Self {
            id: JobId::new(JobType::Relocate, application.application_id()),
            application,
            context,
            status: JobStatus::new(initial),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> Condition {
        self.status.get()
    }

    pub async fn run(&self, cancel: Cancellation) {
        let Some(result) = cancel
            .run(self.context.applications.sync_version(&self.application))
            .await
        else {
            return;
        };
        let condition = match result {
            Ok(sync) if sync.deployed => {
                info!(job = %self.id, "Relocated version {}", sync.version);
                self.context
                    .condition(ConditionType::Relocation, RelocationStatus::Done.as_str())
                    .with_msg("Relocation state changed to 'Done'.")
            }
            Ok(sync) => self
                .context
                .condition(ConditionType::Relocation, RelocationStatus::Failure.as_str())
                .with_reason("SyncError")
                .with_msg(format!("Relocation failure: {}", sync.health)),
            Err(e) => {
                warn!(job = %self.id, "Relocation sync failed: {}", e);
                self.context
                    .condition(ConditionType::Relocation, RelocationStatus::Failure.as_str())
                    .with_reason("SyncError")
                    .with_msg(format!("Relocation failure: {e}"))
            }
        };
        self.context
            .report(&self.status, &cancel, condition, &[])
            .await;
    }
}
