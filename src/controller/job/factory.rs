//! Builds jobs bound to an application and the zone's collaborators.

use super::{
    AsyncJob, DeployJob, JobContext, JobType, OperationJob, OwnershipTransferJob, PlacementJob,
    RelocationJob, UndeployJob,
};
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::controller::events::EventSink;
use crate::controller::status::StatusUpdater;
use crate::controller::store::ApplicationStore;
use crate::controller::sync::Applications;
use crate::crd::AnyApplication;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct JobFactory {
    store: Arc<dyn ApplicationStore>,
    events: Arc<dyn EventSink>,
    applications: Arc<dyn Applications>,
    clock: Arc<dyn Clock>,
    runtime: RuntimeConfig,
    status_update_retries: u32,
}

impl JobFactory {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        events: Arc<dyn EventSink>,
        applications: Arc<dyn Applications>,
        clock: Arc<dyn Clock>,
        runtime: RuntimeConfig,
        status_update_retries: u32,
    ) -> Self {
        Self {
            store,
            events,
            applications,
            clock,
            runtime,
            status_update_retries,
        }
    }

    pub fn zone_id(&self) -> &str {
        &self.runtime.zone_id
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn context(&self, application: &AnyApplication) -> JobContext {
        JobContext {
            updater: StatusUpdater::new(
                Arc::clone(&self.store),
                Arc::clone(&self.events),
                application.application_id(),
                self.runtime.zone_id.clone(),
                self.status_update_retries,
            ),
            applications: Arc::clone(&self.applications),
            clock: Arc::clone(&self.clock),
            runtime: self.runtime.clone(),
        }
    }

    pub fn create(&self, job_type: JobType, application: &AnyApplication) -> AsyncJob {
        let context = self.context(application);
        match job_type {
            JobType::Deploy => AsyncJob::Deploy(DeployJob::new(application.clone(), context)),
            JobType::Undeploy => {
                AsyncJob::Undeploy(UndeployJob::new(application.clone(), context))
            }
            JobType::LocalOperation => {
                AsyncJob::LocalOperation(OperationJob::new(application.clone(), context))
            }
            JobType::LocalPlacement => {
                AsyncJob::LocalPlacement(PlacementJob::new(application, context))
            }
            JobType::Relocate => AsyncJob::Relocate(RelocationJob::new(application.clone(), context)),
            JobType::OwnershipTransfer => AsyncJob::OwnershipTransfer(OwnershipTransferJob::new(
                application.clone(),
                context,
            )),
        }
    }
}
