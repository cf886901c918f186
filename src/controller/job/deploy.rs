//! # Deploy Job
//!
//! Syncs the target version into the zone until every rendered resource exists.
//!
//! One sync cycle runs immediately, then one per `poll_sync_status_interval`.
//! A sync error or a passed deadline costs one attempt; the last attempt ends
//! the job with a `Failure` condition.

use super::{ticker, Cancellation, JobContext, JobId, JobStatus, JobType};
use crate::config::format_duration;
use crate::crd::{AnyApplication, Condition, ConditionType, DeploymentStatus};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Conditions a deployment outcome supersedes
const SUPERSEDED: [ConditionType; 2] = [ConditionType::Undeployment, ConditionType::Local];

#[derive(Debug)]
pub struct DeployJob {
    id: JobId,
    application: AnyApplication,
    context: JobContext,
    max_attempts: u32,
    timeout: Duration,
    status: JobStatus,
}

fn attempt_number(attempt: u32) -> i32 {
    i32::try_from(attempt).unwrap_or(i32::MAX)
}

impl DeployJob {
    pub fn new(application: AnyApplication, context: JobContext) -> Self {
        let max_attempts = application.spec.recover_strategy.max_attempts();
        let timeout = application.sync_timeout(context.runtime.default_sync_timeout);
        let initial = context
            .condition(ConditionType::Deployment, DeploymentStatus::Pull.as_str())
            .with_retry_attempt(1);
        Self {
            id: JobId::new(JobType::Deploy, application.application_id()),
            application,
            context,
            max_attempts,
            timeout,
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
        info!(
            job = %self.id,
            version = self.application.target_version().unwrap_or_default(),
            "Deploy started, {} attempts, timeout {}",
            self.max_attempts,
            format_duration(self.timeout)
        );
        let mut attempt: u32 = 1;
        let mut deadline = self.context.deadline(self.timeout);
        let mut ticker = ticker(self.context.runtime.poll_sync_status_interval);

        loop {
            let Some(result) = cancel
                .run(self.context.applications.sync_version(&self.application))
                .await
            else {
                debug!(job = %self.id, "Deploy cancelled");
                return;
            };

            match result {
                Ok(sync) if sync.deployed => {
                    let condition = self
                        .condition(DeploymentStatus::Done, attempt)
                        .with_msg("Deployment state changed to 'Done'. ");
                    self.report(&cancel, condition).await;
                    info!(job = %self.id, "Deployed version {}", sync.version);
                    return;
                }
                Ok(sync) => {
                    debug!(job = %self.id, "Deployment in progress: {}", sync.health);
                    if self.context.is_past(deadline) {
                        if attempt < self.max_attempts {
                            attempt += 1;
                            deadline = self.context.deadline(self.timeout);
                            self.retry(&cancel, attempt, "Timeout").await;
                        } else {
                            let condition = self
                                .condition(DeploymentStatus::Failure, attempt)
                                .with_reason("Timeout")
                                .with_msg(format!(
                                    "Deployment failure: Deployment timed out after {}",
                                    format_duration(self.timeout)
                                ));
                            self.report(&cancel, condition).await;
                            warn!(job = %self.id, "Deployment timed out");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(job = %self.id, "Sync failed on attempt {}: {}", attempt, e);
                    if attempt < self.max_attempts {
                        attempt += 1;
                        deadline = self.context.deadline(self.timeout);
                        self.retry(&cancel, attempt, "SyncError").await;
                    } else {
                        let condition = self
                            .condition(DeploymentStatus::Failure, attempt)
                            .with_reason("SyncError")
                            .with_msg(format!("Deployment failure: {e}"));
                        self.report(&cancel, condition).await;
                        return;
                    }
                }
            }

            if cancel.run(ticker.tick()).await.is_none() {
                debug!(job = %self.id, "Deploy cancelled");
                return;
            }
        }
    }

    fn condition(&self, status: DeploymentStatus, attempt: u32) -> Condition {
        self.context
            .condition(ConditionType::Deployment, status.as_str())
            .with_retry_attempt(attempt_number(attempt))
    }

    async fn retry(&self, cancel: &Cancellation, attempt: u32, reason: &str) {
        let condition = self
            .condition(DeploymentStatus::Pull, attempt)
            .with_reason(reason)
            .with_msg(format!(
                "Deployment failure: Retrying deployment (attempt {} of {})",
                attempt, self.max_attempts
            ));
        self.report(cancel, condition).await;
    }

    async fn report(&self, cancel: &Cancellation, condition: Condition) {
        self.context
            .report(&self.status, cancel, condition, &SUPERSEDED)
            .await;
    }
}
