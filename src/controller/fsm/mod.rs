//! # State Machines
//!
//! Pure decision logic: given an application's status as seen by this zone,
//! whether its resources are present here and which job is running for it,
//! decide the next global state, the condition delta and the job delta.
//!
//! - [`GlobalStateMachine`] runs in the owner zone and drives the lifecycle.
//! - [`LocalStateMachine`] runs in every other zone the application touches.
//! - [`derive_new_status`] picks one of them and folds its result into a new status.
//!
//! Nothing here performs I/O. Jobs are created (not started) through the
//! [`JobFactory`]; the reconciler starts them.

mod application;
mod global;
mod local;

pub use application::{derive_new_status, StatusResult};
pub use global::GlobalStateMachine;
pub use local::LocalStateMachine;

use crate::controller::job::{AsyncJob, JobFactory, JobType};
use crate::crd::{
    AnyApplication, AnyApplicationStatus, Condition, ConditionType, GlobalState, HealthStatusCode,
    UndeploymentStatus,
};
use std::str::FromStr;

/// Job delta of a transition
#[derive(Debug, Default)]
pub struct NextJobs {
    /// Job to start, replacing the running one
    pub to_add: Option<AsyncJob>,
    /// Type of job to stop if it is the running one
    pub to_remove: Option<JobType>,
}

impl NextJobs {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_none() && self.to_remove.is_none()
    }
}

/// Outcome of one state machine step
#[derive(Debug, Default)]
pub struct NextStateResult {
    pub next_state: Option<GlobalState>,
    pub conditions_to_add: Option<Condition>,
    pub conditions_to_remove: Vec<ConditionType>,
    pub jobs: NextJobs,
}

impl NextStateResult {
    /// Move to (or stay in) `state` with no other effect
    pub fn stay(state: GlobalState) -> Self {
        Self {
            next_state: Some(state),
            ..Self::default()
        }
    }

    /// Start `job` and record its initial condition
    pub fn dispatch(state: Option<GlobalState>, job: AsyncJob) -> Self {
        Self {
            next_state: state,
            conditions_to_add: Some(job.status()),
            jobs: NextJobs {
                to_add: Some(job),
                to_remove: None,
            },
            ..Self::default()
        }
    }

    #[must_use]
    pub fn removing(mut self, condition_type: ConditionType) -> Self {
        if !self.conditions_to_remove.contains(&condition_type) {
            self.conditions_to_remove.push(condition_type);
        }
        self
    }
}

/// What a state machine sees of an application
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub application: &'a AnyApplication,
    /// Working status, with the running job's condition already merged in
    pub status: &'a AnyApplicationStatus,
    /// Resources of the application exist in this zone
    pub present: bool,
    /// Type of the job currently running for the application
    pub running_job: Option<JobType>,
}

impl Observation<'_> {
    pub(crate) fn condition(&self, condition_type: ConditionType, zone_id: &str) -> Option<&Condition> {
        self.status.find_condition(condition_type, zone_id)
    }

    pub(crate) fn is_targeted(&self, zone_id: &str) -> bool {
        self.status.placements_contain(zone_id)
    }

    pub(crate) fn is_running(&self, job_type: JobType) -> bool {
        self.running_job == Some(job_type)
    }
}

/// Job to start when `condition` shows that none is, or should be, in flight
///
/// A job is (re)started when its condition does not exist yet, or when the
/// condition still reports the in-flight `pending` status but no job of that
/// type is running for the application.
pub(crate) fn ensure_job(
    observation: &Observation<'_>,
    factory: &JobFactory,
    job_type: JobType,
    condition: Option<&Condition>,
    pending: &str,
) -> Option<AsyncJob> {
    let start = match condition {
        None => true,
        Some(condition) => condition.status == pending && !observation.is_running(job_type),
    };
    start.then(|| factory.create(job_type, observation.application))
}

/// Local condition reports a health that ends health polling
pub(crate) fn is_terminal_health(condition: &Condition) -> bool {
    matches!(
        HealthStatusCode::from_str(&condition.status),
        Ok(HealthStatusCode::Degraded | HealthStatusCode::Unknown | HealthStatusCode::Missing)
    )
}

/// Health polling for a zone that runs the application
pub(crate) fn operate(
    observation: &Observation<'_>,
    factory: &JobFactory,
    state: Option<GlobalState>,
) -> NextStateResult {
    let start = match observation.condition(ConditionType::Local, factory.zone_id()) {
        None => true,
        Some(local) => !is_terminal_health(local) && !observation.is_running(JobType::LocalOperation),
    };
    if start {
        NextStateResult::dispatch(
            state,
            factory.create(JobType::LocalOperation, observation.application),
        )
    } else {
        NextStateResult {
            next_state: state,
            ..NextStateResult::default()
        }
    }
}

/// Removal of the application from a zone that is no longer a placement target
///
/// The `Local` condition is dropped once an `Undeployment` condition exists.
pub(crate) fn release(
    observation: &Observation<'_>,
    factory: &JobFactory,
    state: Option<GlobalState>,
) -> NextStateResult {
    let zone_id = factory.zone_id();
    if !observation.present {
        return NextStateResult {
            next_state: state,
            ..NextStateResult::default()
        }
        .removing(ConditionType::Local)
        .removing(ConditionType::Deployment);
    }

    let undeployment = observation.condition(ConditionType::Undeployment, zone_id);
    let job = ensure_job(
        observation,
        factory,
        JobType::Undeploy,
        undeployment,
        UndeploymentStatus::Undeploy.as_str(),
    );
    let result = match job {
        Some(job) => NextStateResult::dispatch(state, job),
        None => NextStateResult {
            next_state: state,
            ..NextStateResult::default()
        },
    };
    if undeployment.is_some() {
        result.removing(ConditionType::Local)
    } else {
        result
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the state machine tests.

    use crate::clock::FakeClock;
    use crate::config::RuntimeConfig;
    use crate::controller::events::RecordingEvents;
    use crate::controller::job::JobFactory;
    use crate::controller::store::InMemoryApplicationStore;
    use crate::controller::sync::{
        Applications, DeleteResult, HealthStatus, LocalApplication, SyncError, SyncResult,
    };
    use crate::crd::{
        AnyApplication, AnyApplicationSpec, AnyApplicationStatus, ApplicationMatcherSpec,
        Condition, ConditionType, HelmSelectorSpec, PlacementStrategy,
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    pub const ZONE: &str = "zone";

    /// Applications that are never touched by the pure state machines
    #[derive(Debug)]
    pub struct InertApplications;

    #[async_trait]
    impl Applications for InertApplications {
        async fn sync_version(&self, _: &AnyApplication) -> Result<SyncResult, SyncError> {
            Err(SyncError::Manifest("not available in tests".to_string()))
        }

        async fn cleanup(&self, _: &AnyApplication) -> Result<Vec<DeleteResult>, SyncError> {
            Ok(Vec::new())
        }

        async fn present_versions(&self, _: &AnyApplication) -> Result<Vec<String>, SyncError> {
            Ok(Vec::new())
        }

        async fn aggregated_health(&self, _: &AnyApplication) -> Result<HealthStatus, SyncError> {
            Ok(HealthStatus::healthy())
        }

        async fn load_local_application(
            &self,
            _: &AnyApplication,
        ) -> Result<Option<LocalApplication>, SyncError> {
            Ok(None)
        }
    }

    pub fn factory() -> JobFactory {
        JobFactory::new(
            Arc::new(InMemoryApplicationStore::new()),
            Arc::new(RecordingEvents::new()),
            Arc::new(InertApplications),
            Arc::new(FakeClock::default()),
            RuntimeConfig::for_zone(ZONE),
            3,
        )
    }

    pub fn application(strategy: PlacementStrategy, status: AnyApplicationStatus) -> AnyApplication {
        let mut application = AnyApplication::new(
            "nginx",
            AnyApplicationSpec {
                application: ApplicationMatcherSpec {
                    resource_selector: None,
                    helm: Some(HelmSelectorSpec {
                        repository: "https://charts.example.com".to_string(),
                        chart: "nginx".to_string(),
                        version: "1.0.0".to_string(),
                        namespace: "web".to_string(),
                        values: None,
                    }),
                },
                zones: 1,
                placement_strategy: crate::crd::PlacementStrategySpec { strategy },
                recover_strategy: crate::crd::RecoverStrategySpec::default(),
                sync_policy: None,
            },
        );
        application.metadata.namespace = Some("default".to_string());
        application.status = Some(status);
        application
    }

    pub fn condition(condition_type: ConditionType, zone: &str, status: &str) -> Condition {
        Condition::new(condition_type, zone, status, "2025-01-01T00:00:00Z")
    }
}
