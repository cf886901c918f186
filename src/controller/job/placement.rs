//! # Local Placement Job
//!
//! Places the application on the zone running it. Single shot: one status
//! write sets `placements` and marks the `Placement` condition `Done`.

use super::{Cancellation, JobContext, JobId, JobStatus, JobType};
use crate::controller::events::Event;
use crate::crd::{AnyApplication, Condition, ConditionType, Placement, PlacementStatus};
use tracing::{info, warn};

#[derive(Debug)]
pub struct PlacementJob {
    id: JobId,
    context: JobContext,
    status: JobStatus,
}

impl PlacementJob {
    pub fn new(application: &AnyApplication, context: JobContext) -> Self {
        let initial =
            context.condition(ConditionType::Placement, PlacementStatus::InProgress.as_str());
        Self {
            id: JobId::new(JobType::LocalPlacement, application.application_id()),
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
        let zone_id = self.context.zone_id().to_string();
        let condition = self
            .context
            .condition(ConditionType::Placement, PlacementStatus::Done.as_str())
            .with_msg(format!("Placement set to zone '{zone_id}'"));
        self.status.set(condition.clone());

        let update = self.context.updater.update_status(|status, zone| {
            let placements = vec![Placement::zone(zone)];
            let mut changed = status.placements != placements;
            status.placements = placements;
            changed |= status.add_or_update(condition.clone(), zone);
            changed.then(|| Event::local(format!("Placement set to zone '{zone}'")))
        });
        match cancel.run(update).await {
            Some(Ok(_)) => info!(job = %self.id, "Placement set to zone '{}'", zone_id),
            Some(Err(e)) => warn!(job = %self.id, "Failed to write placement: {}", e),
            None => {}
        }
    }
}
