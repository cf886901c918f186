//! Combined state machine: picks the global or the local machine and folds its
//! result into a new status value.

use super::{GlobalStateMachine, LocalStateMachine, NextJobs, NextStateResult, Observation};
use crate::controller::job::{AsyncJob, JobFactory};
use crate::crd::{AnyApplication, AnyApplicationStatus, GlobalState};

/// New status (when anything changed) and the job delta
#[derive(Debug, Default)]
pub struct StatusResult {
    pub status: Option<AnyApplicationStatus>,
    pub jobs: NextJobs,
}

/// Compute the next status of `application` as seen by this zone
///
/// - An application without state is claimed: owner is this zone, state `New`.
/// - The running job's condition is merged in before any decision.
/// - The owner zone runs the global machine, other zones the local machine
///   when the application is present or placed here.
///
/// A job delta always comes with a status, even if the status is unchanged.
pub fn derive_new_status(
    application: &AnyApplication,
    present: bool,
    current_job: Option<&AsyncJob>,
    factory: &JobFactory,
) -> StatusResult {
    let zone_id = factory.zone_id();
    let original = application.status_or_default();
    let mut status = original.clone();

    if status.state == GlobalState::Unknown {
        status.owner = zone_id.to_string();
        status.state = GlobalState::New;
    }
    if let Some(job) = current_job {
        status.add_or_update(job.status(), zone_id);
    }

    let observation = Observation {
        application,
        status: &status,
        present,
        running_job: current_job.map(AsyncJob::job_type),
    };
    let result = if status.owner == zone_id {
        GlobalStateMachine::new(observation, factory).next()
    } else if present || status.placements_contain(zone_id) {
        LocalStateMachine::new(observation, factory).next()
    } else {
        NextStateResult::default()
    };

    let NextStateResult {
        next_state,
        conditions_to_add,
        conditions_to_remove,
        jobs,
    } = result;
    for condition_type in conditions_to_remove {
        status.remove(condition_type, zone_id);
    }
    if let Some(condition) = conditions_to_add {
        status.add_or_update(condition, zone_id);
    }
    if let Some(state) = next_state {
        status.state = state;
    }

    let changed = status != original || !jobs.is_empty();
    StatusResult {
        status: changed.then_some(status),
        jobs,
    }
}
