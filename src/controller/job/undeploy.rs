//! # Undeploy Job
//!
//! Deletes every version of the application present in the zone.

use super::{ticker, Cancellation, JobContext, JobId, JobStatus, JobType};
use crate::config::format_duration;
use crate::controller::sync::{DeleteResult, SyncError};
use crate::crd::{AnyApplication, Condition, ConditionType, UndeploymentStatus};
use tracing::{debug, info, warn};

/// Conditions an undeployment outcome supersedes
const SUPERSEDED: [ConditionType; 2] = [ConditionType::Local, ConditionType::Deployment];

#[derive(Debug)]
pub struct UndeployJob {
    id: JobId,
    application: AnyApplication,
    context: JobContext,
    max_attempts: u32,
    status: JobStatus,
}

enum Progress {
    /// Nothing of the application is left
    Gone(String),
    /// Deletion issued, some resources remain
    Pending(String),
}

impl UndeployJob {
    pub fn new(application: AnyApplication, context: JobContext) -> Self {
        let max_attempts = application.spec.recover_strategy.max_attempts();
        let initial = context
            .condition(ConditionType::Undeployment, UndeploymentStatus::Undeploy.as_str())
            .with_retry_attempt(1);
        Self {
            id: JobId::new(JobType::Undeploy, application.application_id()),
            application,
            context,
            max_attempts,
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
        let timeout = self.context.runtime.default_undeploy_timeout;
        info!(job = %self.id, "Undeploy started, {} attempts", self.max_attempts);
        let mut attempt: u32 = 1;
        let mut deadline = self.context.deadline(timeout);
        let mut ticker = ticker(self.context.runtime.poll_sync_status_interval);

        loop {
            let Some(result) = cancel.run(self.undeploy_once()).await else {
                debug!(job = %self.id, "Undeploy cancelled");
                return;
            };

            let failure = match result {
                Ok(Progress::Gone(details)) => {
                    let condition = self
                        .condition(UndeploymentStatus::Done, attempt)
                        .with_msg(details);
                    self.report(&cancel, condition).await;
                    info!(job = %self.id, "Undeploy complete");
                    return;
                }
                Ok(Progress::Pending(details)) => {
                    let condition = self
                        .condition(UndeploymentStatus::Undeploy, attempt)
                        .with_msg(details);
                    self.report(&cancel, condition).await;
                    self.context.is_past(deadline).then(|| {
                        format!("Undeploy timed out after {}.", format_duration(timeout))
                    })
                }
                Err(e) => {
                    warn!(job = %self.id, "Undeploy attempt {} failed: {}", attempt, e);
                    Some(e.to_string())
                }
            };

            if let Some(msg) = failure {
                if attempt < self.max_attempts {
                    attempt += 1;
                    deadline = self.context.deadline(timeout);
                    let condition = self
                        .condition(UndeploymentStatus::Undeploy, attempt)
                        .with_reason("UndeployError")
                        .with_msg(format!(
                            "Undeploy failure: {} Retrying undeployment (attempt {} of {}).",
                            msg, attempt, self.max_attempts
                        ));
                    self.report(&cancel, condition).await;
                } else {
                    let condition = self
                        .condition(UndeploymentStatus::Failure, attempt)
                        .with_reason("UndeployError")
                        .with_msg(format!(
                            "Undeploy failure: Failure after {} attempts.",
                            self.max_attempts
                        ));
                    self.report(&cancel, condition).await;
                    return;
                }
            }

            if cancel.run(ticker.tick()).await.is_none() {
                debug!(job = %self.id, "Undeploy cancelled");
                return;
            }
        }
    }

    async fn undeploy_once(&self) -> Result<Progress, SyncError> {
        let applications = &self.context.applications;
        let versions = applications.present_versions(&self.application).await?;
        if versions.is_empty() {
            return Ok(Progress::Gone(
                "No versions found, undeployment is complete".to_string(),
            ));
        }
        debug!(job = %self.id, "Deleting versions {:?}", versions);
        let results = applications.cleanup(&self.application).await?;
        let details = DeleteResult::summary(&results);
        if DeleteResult::any_present(&results) {
            Ok(Progress::Pending(details))
        } else {
            Ok(Progress::Gone(format!(
                "Undeploy state changed to 'Done'.{details}"
            )))
        }
    }

    fn condition(&self, status: UndeploymentStatus, attempt: u32) -> Condition {
        self.context
            .condition(ConditionType::Undeployment, status.as_str())
            .with_retry_attempt(i32::try_from(attempt).unwrap_or(i32::MAX))
    }

    async fn report(&self, cancel: &Cancellation, condition: Condition) {
        self.context
            .report(&self.status, cancel, condition, &SUPERSEDED)
            .await;
    }
}
