//! # Local Operation Job
//!
//! Health poll of a running application. Writes the aggregated health as the
//! zone's `Local` condition on every tick and exits once the health is terminal.

use super::{ticker, Cancellation, JobContext, JobId, JobStatus, JobType};
use crate::controller::sync::HealthStatus;
use crate::crd::{AnyApplication, Condition, ConditionType, HealthStatusCode};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct OperationJob {
    id: JobId,
    application: AnyApplication,
    context: JobContext,
    status: JobStatus,
}

impl OperationJob {
    pub fn new(application: AnyApplication, context: JobContext) -> Self {
        let initial =
            context.condition(ConditionType::Local, HealthStatusCode::Progressing.as_str());
        Self {
            id: JobId::new(JobType::LocalOperation, application.application_id()),
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
        debug!(job = %self.id, "Health polling started");
        let mut ticker = ticker(self.context.runtime.poll_operational_status_interval);
        loop {
            let Some(result) = cancel
                .run(self.context.applications.aggregated_health(&self.application))
                .await
            else {
                return;
            };
            let health = result.unwrap_or_else(|e| {
                warn!(job = %self.id, "Health check failed: {}", e);
                HealthStatus::unknown(e.to_string())
            });

            let mut condition = self
                .context
                .condition(ConditionType::Local, health.status.as_str())
                .with_msg(health.message.clone());
            if health.is_terminal() {
                condition = condition.with_reason("HealthCheck");
            }
            self.context
                .report(&self.status, &cancel, condition, &[])
                .await;

            if health.is_terminal() {
                info!(job = %self.id, "Health polling stopped: {}", health);
                return;
            }

            if cancel.run(ticker.tick()).await.is_none() {
                return;
            }
        }
    }
}
