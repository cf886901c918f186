//! # Global State Machine
//!
//! Runs in the owner zone. Drives the application through
//! `New -> Placement -> Operational`, with detours through `Relocation`,
//! `Failure` and `OwnershipTransfer`.
//!
//! There is no terminal state: every reconciliation re-evaluates from the
//! current status. States delegate to each other within one step, so a
//! transition may land several states away from where it started.
//!
//! `Relocation` deploys into the owner zone through a Deploy job tracked by the
//! `Deployment` condition. It does not start a Relocate job; the `Relocation`
//! condition is only written by zones pulling the application in.

use super::{ensure_job, operate, release, NextStateResult, Observation};
use crate::controller::job::{JobFactory, JobType};
use crate::crd::{
    ConditionType, DeploymentStatus, GlobalState, OwnershipTransferStatus, PlacementStatus,
    PlacementStrategy,
};

#[derive(Debug)]
pub struct GlobalStateMachine<'a> {
    observation: Observation<'a>,
    factory: &'a JobFactory,
}

impl<'a> GlobalStateMachine<'a> {
    pub fn new(observation: Observation<'a>, factory: &'a JobFactory) -> Self {
        Self {
            observation,
            factory,
        }
    }

    pub fn next(&self) -> NextStateResult {
        match self.observation.status.state {
            GlobalState::Unknown | GlobalState::New | GlobalState::Placement => self.placement(),
            GlobalState::Operational => self.operational(),
            GlobalState::Relocation => self.relocation(),
            GlobalState::Failure => self.failure(),
            GlobalState::OwnershipTransfer => self.ownership_transfer(),
        }
    }

    fn zone_id(&self) -> &str {
        self.factory.zone_id()
    }

    fn is_targeted(&self) -> bool {
        self.observation.is_targeted(self.zone_id())
    }

    /// More zones report a failing condition than the recover strategy tolerates
    pub fn is_failing(&self) -> bool {
        let failing = &self.factory.runtime().failing_conditions;
        let failing_zones = self
            .observation
            .status
            .zones
            .iter()
            .filter(|zone| zone.conditions.iter().any(|c| failing.is_failing(c)))
            .count();
        let tolerance = usize::try_from(
            self.observation
                .application
                .spec
                .recover_strategy
                .tolerance,
        )
        .unwrap_or(0);
        failing_zones > tolerance
    }

    fn dispatch(&self, state: GlobalState, job_type: JobType) -> NextStateResult {
        NextStateResult::dispatch(
            Some(state),
            self.factory.create(job_type, self.observation.application),
        )
    }

    fn placement(&self) -> NextStateResult {
        let placement = self
            .observation
            .condition(ConditionType::Placement, self.zone_id());
        if placement.is_some_and(|c| c.status == PlacementStatus::Failure.as_str()) {
            return NextStateResult::stay(GlobalState::Failure);
        }

        if self.observation.status.has_placements() {
            return if self.is_targeted() {
                self.operational()
            } else {
                NextStateResult::stay(GlobalState::Placement)
            };
        }

        if self.observation.application.spec.placement_strategy.strategy == PlacementStrategy::Local {
            if let Some(job) = ensure_job(
                &self.observation,
                self.factory,
                JobType::LocalPlacement,
                placement,
                PlacementStatus::InProgress.as_str(),
            ) {
                return NextStateResult::dispatch(Some(GlobalState::Placement), job);
            }
        }
        NextStateResult::stay(GlobalState::Placement)
    }

    fn operational(&self) -> NextStateResult {
        if self.is_failing() {
            return NextStateResult::stay(GlobalState::Failure);
        }
        if !self.is_targeted() {
            return release(&self.observation, self.factory, Some(GlobalState::Operational));
        }

        let deployment = self
            .observation
            .condition(ConditionType::Deployment, self.zone_id());
        let deploying = deployment.is_some_and(|c| c.status != DeploymentStatus::Done.as_str());
        if !self.observation.present || deploying {
            return self.relocation();
        }
        operate(&self.observation, self.factory, Some(GlobalState::Operational))
    }

    fn relocation(&self) -> NextStateResult {
        if !self.is_targeted() {
            return self.operational();
        }
        if self.is_failing() {
            return NextStateResult::stay(GlobalState::Failure);
        }

        let deployment = self
            .observation
            .condition(ConditionType::Deployment, self.zone_id());
        let Some(deployment) = deployment else {
            return self.dispatch(GlobalState::Relocation, JobType::Deploy);
        };

        let running = self.observation.is_running(JobType::Deploy);
        match deployment.status.parse::<DeploymentStatus>() {
            Ok(DeploymentStatus::Done) if self.observation.present => self.operational(),
            Ok(DeploymentStatus::Done) if !running => {
                self.dispatch(GlobalState::Relocation, JobType::Deploy)
            }
            Ok(DeploymentStatus::Pull | DeploymentStatus::Failure) if !running => {
                self.dispatch(GlobalState::Relocation, JobType::Deploy)
            }
            _ => NextStateResult::stay(GlobalState::Relocation),
        }
    }

    fn failure(&self) -> NextStateResult {
        if self.is_failing() {
            NextStateResult::stay(GlobalState::Failure)
        } else {
            self.operational()
        }
    }

    fn ownership_transfer(&self) -> NextStateResult {
        let transfer = self
            .observation
            .condition(ConditionType::OwnershipTransfer, self.zone_id());
        let succeeded =
            transfer.is_some_and(|c| c.status == OwnershipTransferStatus::Success.as_str());

        if succeeded && self.is_targeted() {
            let mut result = self.operational().removing(ConditionType::OwnershipTransfer);
            result.jobs.to_remove = Some(JobType::OwnershipTransfer);
            return result;
        }

        match ensure_job(
            &self.observation,
            self.factory,
            JobType::OwnershipTransfer,
            transfer,
            OwnershipTransferStatus::Pulling.as_str(),
        ) {
            Some(job) => NextStateResult::dispatch(Some(GlobalState::OwnershipTransfer), job),
            None => NextStateResult::stay(GlobalState::OwnershipTransfer),
        }
    }
}
