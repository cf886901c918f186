//! # Job Registry
//!
//! At most one running job per application.
//!
//! The registry entry owns the job's cancellation sender. `execute` replaces
//! the entry for the application without stopping the previous job, so callers
//! that need exclusivity stop first. A finished job removes its own entry only
//! if the entry still holds that job.

use super::{AsyncJob, Cancellation, JobType};
use crate::crd::ApplicationId;
use crate::observability::metrics;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Debug)]
struct RunningJob {
    job: Arc<AsyncJob>,
    cancel: watch::Sender<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<ApplicationId, RunningJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job` for its application and spawn it
    pub fn execute(&self, job: AsyncJob) -> Arc<AsyncJob> {
        let job = Arc::new(job);
        let (sender, cancel) = Cancellation::channel();
        let application_id = job.application_id().clone();
        let job_id = job.job_id().clone();

        self.jobs.insert(
            application_id.clone(),
            RunningJob {
                job: Arc::clone(&job),
                cancel: sender,
            },
        );
        metrics::increment_jobs_started(job.job_type().as_str());
        metrics::increment_jobs_active();
        info!(application = %application_id, job = %job_id, "Job started");

        let jobs = Arc::clone(&self.jobs);
        let task_job = Arc::clone(&job);
        tokio::spawn(async move {
            task_job.run(cancel).await;
            jobs.remove_if(&application_id, |_, running| running.job.job_id() == &job_id);
            metrics::decrement_jobs_active();
            debug!(application = %application_id, job = %job_id, "Job finished");
        });
        job
    }

    /// The running job of the application
    ///
    /// # Panics
    ///
    /// When the entry holds a job of another application. That can only
    /// happen through a bug in this module and is not recoverable.
    pub fn get_current(&self, application_id: &ApplicationId) -> Option<Arc<AsyncJob>> {
        let entry = self.jobs.get(application_id)?;
        assert_eq!(
            entry.job.application_id(),
            application_id,
            "job registry entry {} holds job {}",
            application_id,
            entry.job.job_id()
        );
        Some(Arc::clone(&entry.job))
    }

    /// Cancel the running job of the application, true if there was one
    pub fn stop(&self, application_id: &ApplicationId) -> bool {
        match self.jobs.remove(application_id) {
            Some((_, running)) => {
                running.cancel.send_replace(true);
                info!(application = %application_id, job = %running.job.job_id(), "Job stopped");
                true
            }
            None => false,
        }
    }

    /// Cancel the running job of the application if it has the given type
    pub fn stop_if_type(&self, application_id: &ApplicationId, job_type: JobType) -> bool {
        let matches = self
            .jobs
            .get(application_id)
            .is_some_and(|running| running.job.job_type() == job_type);
        matches && self.stop(application_id)
    }

    /// Cancel every running job
    pub fn stop_all(&self) {
        let ids: Vec<ApplicationId> = self.jobs.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.stop(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
