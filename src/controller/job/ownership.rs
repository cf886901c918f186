//! # Ownership Transfer Job
//!
//! Takes over an application whose owner zone changed: one sync attempt,
//! reported as the zone's `OwnershipTransfer` condition.

use super::{Cancellation, JobContext, JobId, JobStatus, JobType};
use crate::crd::{AnyApplication, Condition, ConditionType, OwnershipTransferStatus};
use tracing::{info, warn};

#[derive(Debug)]
pub struct OwnershipTransferJob {
    id: JobId,
    application: AnyApplication,
    context: JobContext,
    status: JobStatus,
}

impl OwnershipTransferJob {
    pub fn new(application: AnyApplication, context: JobContext) -> Self {
        let initial = context
            .condition(
                ConditionType::OwnershipTransfer,
                OwnershipTransferStatus::Pulling.as_str(),
            )
            .with_msg("Ownership transfer in progress");
        Self {
            id: JobId::new(JobType::OwnershipTransfer, application.application_id()),
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
        let (status, msg) = match result {
            Ok(sync) if sync.deployed => {
                info!(job = %self.id, "Ownership transferred to zone {}", self.context.zone_id());
                (OwnershipTransferStatus::Success, "Ownership transfer completed".to_string())
            }
            Ok(sync) => (
                OwnershipTransferStatus::Failure,
                format!("Ownership transfer failure: {}", sync.health),
            ),
            Err(e) => {
                warn!(job = %self.id, "Ownership transfer sync failed: {}", e);
                (
                    OwnershipTransferStatus::Failure,
                    format!("Ownership transfer failure: {e}"),
                )
            }
        };
        let condition = self
            .context
            .condition(ConditionType::OwnershipTransfer, status.as_str())
            .with_msg(msg);
        self.context
            .report(&self.status, &cancel, condition, &[])
            .await;
    }
}
