//! # Local State Machine
//!
//! Runs in zones that do not own the application. Only decides which job
//! this zone needs; the global state is left to the owner.
//!
//! | placement target | resources present | action                                   |
//! |------------------|-------------------|------------------------------------------|
//! | no               | yes               | undeploy                                 |
//! | yes              | no                | deploy (relocate during ownership change)|
//! | yes              | yes               | health polling unless a deploy is active |

use super::{ensure_job, operate, release, NextStateResult, Observation};
use crate::controller::job::{JobFactory, JobType};
use crate::crd::{ConditionType, DeploymentStatus, GlobalState, RelocationStatus};

#[derive(Debug)]
pub struct LocalStateMachine<'a> {
    observation: Observation<'a>,
    factory: &'a JobFactory,
}

impl<'a> LocalStateMachine<'a> {
    pub fn new(observation: Observation<'a>, factory: &'a JobFactory) -> Self {
        Self {
            observation,
            factory,
        }
    }

    pub fn next(&self) -> NextStateResult {
        let zone_id = self.factory.zone_id();
        let targeted = self.observation.is_targeted(zone_id);
        match (targeted, self.observation.present) {
            (false, true) => release(&self.observation, self.factory, None),
            (true, false) if self.observation.status.state == GlobalState::OwnershipTransfer => {
                self.relocate()
            }
            (true, false) => self.deploy(),
            (true, true) => {
                let deployment = self.observation.condition(ConditionType::Deployment, zone_id);
                if deployment.is_some_and(|c| c.status == DeploymentStatus::Pull.as_str()) {
                    self.deploy()
                } else {
                    operate(&self.observation, self.factory, None)
                }
            }
            (false, false) => NextStateResult::default(),
        }
    }

    fn deploy(&self) -> NextStateResult {
        let deployment = self
            .observation
            .condition(ConditionType::Deployment, self.factory.zone_id());
        // a finished deployment whose resources are gone is deployed again
        let redeploy = deployment.is_some_and(|c| {
            c.status == DeploymentStatus::Done.as_str() && !self.observation.present
        });
        let job = if redeploy {
            Some(self.factory.create(JobType::Deploy, self.observation.application))
        } else {
            ensure_job(
                &self.observation,
                self.factory,
                JobType::Deploy,
                deployment,
                DeploymentStatus::Pull.as_str(),
            )
        };
        job.map(|job| NextStateResult::dispatch(None, job))
            .unwrap_or_default()
    }

    fn relocate(&self) -> NextStateResult {
        let relocation = self
            .observation
            .condition(ConditionType::Relocation, self.factory.zone_id());
        let job = if relocation.is_some_and(|c| c.status == RelocationStatus::Done.as_str()) {
            Some(self.factory.create(JobType::Relocate, self.observation.application))
        } else {
            ensure_job(
                &self.observation,
                self.factory,
                JobType::Relocate,
                relocation,
                RelocationStatus::Pull.as_str(),
            )
        };
        job.map(|job| NextStateResult::dispatch(None, job))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{application, condition, factory, ZONE};
    use super::*;
    use crate::crd::{AnyApplicationStatus, Placement, PlacementStrategy};

    fn status(state: GlobalState, placements: &[&str]) -> AnyApplicationStatus {
        AnyApplicationStatus {
            state,
            owner: "owner-zone".to_string(),
            placements: placements.iter().map(|z| Placement::zone(*z)).collect(),
            zones: Vec::new(),
        }
    }

    fn step(
        status: &AnyApplicationStatus,
        present: bool,
        running_job: Option<JobType>,
    ) -> NextStateResult {
        let application = application(PlacementStrategy::Global, status.clone());
        let factory = factory();
        let observation = Observation {
            application: &application,
            status,
            present,
            running_job,
        };
        LocalStateMachine::new(observation, &factory).next()
    }

    fn job_type(result: &NextStateResult) -> Option<JobType> {
        result.jobs.to_add.as_ref().map(|job| job.job_type())
    }

    #[test]
    fn test_never_changes_global_state() {
        let cases = [
            (status(GlobalState::Operational, &[ZONE]), false),
            (status(GlobalState::Operational, &[ZONE]), true),
            (status(GlobalState::Operational, &["other"]), true),
            (status(GlobalState::OwnershipTransfer, &[ZONE]), false),
        ];
        for (current, present) in &cases {
            assert_eq!(step(current, *present, None).next_state, None);
        }
    }

    #[test]
    fn test_decision_table() {
        let cases = [
            (&[ZONE][..], false, Some(JobType::Deploy)),
            (&[ZONE][..], true, Some(JobType::LocalOperation)),
            (&["other"][..], true, Some(JobType::Undeploy)),
            (&["other"][..], false, None),
        ];
        for (placements, present, expected) in cases {
            let result = step(&status(GlobalState::Operational, placements), present, None);
            assert_eq!(job_type(&result), expected, "placements={placements:?} present={present}");
        }
    }

    #[test]
    fn test_ownership_change_relocates() {
        let result = step(&status(GlobalState::OwnershipTransfer, &[ZONE]), false, None);
        assert_eq!(job_type(&result), Some(JobType::Relocate));
        assert_eq!(result.conditions_to_add.unwrap().r#type, ConditionType::Relocation);
    }

    #[test]
    fn test_running_health_poll_is_not_duplicated() {
        let mut current = status(GlobalState::Operational, &[ZONE]);
        current.add_or_update(condition(ConditionType::Local, ZONE, "Healthy"), ZONE);
        let result = step(&current, true, Some(JobType::LocalOperation));
        assert!(result.jobs.is_empty());
        assert!(result.conditions_to_add.is_none());
    }

    #[test]
    fn test_deploy_in_flight_blocks_health_poll() {
        let mut current = status(GlobalState::Operational, &[ZONE]);
        current.add_or_update(condition(ConditionType::Deployment, ZONE, "Pull"), ZONE);
        let result = step(&current, true, Some(JobType::Deploy));
        assert!(result.jobs.is_empty());
    }

    #[test]
    fn test_failed_deploy_is_left_to_the_owner() {
        let mut current = status(GlobalState::Operational, &[ZONE]);
        current.add_or_update(condition(ConditionType::Deployment, ZONE, "Failure"), ZONE);
        let result = step(&current, false, None);
        assert!(result.jobs.is_empty());
    }
}
