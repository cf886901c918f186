//! # Reconcile
//!
//! One reconciliation of an AnyApplication in this zone:
//!
//! 1. Deleted applications have their jobs stopped and resources removed
//!    before the finalizer is released.
//! 2. The finalizer is added to applications that lack it.
//! 3. The state machines derive the next status and job delta from the
//!    application, its local presence and the running job.
//! 4. The new status is merged into the stored one, then jobs are stopped
//!    and started. A zone that lost its claim on the application to another
//!    zone writes nothing and touches no job.

use super::merge::{is_ownership_lost, merge_status};
use super::types::{Reconciler, ReconcilerError};
use crate::config::ControllerConfig;
use crate::constants::FINALIZER_NAME;
use crate::controller::events::Event;
use crate::controller::fsm::{derive_new_status, NextJobs};
use crate::controller::status::StatusUpdater;
use crate::controller::sync::{DeleteResult, LocalApplication};
use crate::crd::{AnyApplication, AnyApplicationStatus, GlobalState};
use crate::observability::metrics;
use crate::observability::otel::TRACER_NAME;
use kube_runtime::controller::Action;
use opentelemetry::trace::{Span, Status, Tracer};
use opentelemetry::{global, KeyValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Instrument};

/// Reconcile entry point handed to the kube runtime controller
pub async fn reconcile(
    application: Arc<AnyApplication>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = application.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = application.metadata.namespace.as_deref().unwrap_or("default");
    let resource_key = format!("{namespace}/{name}");

    let span = tracing::info_span!(
        "controller.reconcile",
        resource.name = name,
        resource.namespace = namespace
    );
    let mut otel_span = global::tracer(TRACER_NAME).start("reconcile");
    otel_span.set_attribute(KeyValue::new("resource.name", name.to_string()));
    otel_span.set_attribute(KeyValue::new("resource.namespace", namespace.to_string()));

    metrics::increment_reconciliations();
    let started = Instant::now();
    let result = ctx
        .reconcile_application(&application)
        .instrument(span)
        .await;
    metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

    match &result {
        Ok(_) => ctx.reset_backoff(&resource_key),
        Err(e) => otel_span.set_status(Status::error(e.to_string())),
    }
    otel_span.end();
    result
}

/// Whether this zone has anything to do for an application it does not run
fn is_relevant(status: &AnyApplicationStatus, zone_id: &str) -> bool {
    matches!(status.state, GlobalState::Unknown | GlobalState::New)
        || status.owner == zone_id
        || status.placements_contain(zone_id)
}

impl Reconciler {
    pub async fn reconcile_application(
        &self,
        application: &AnyApplication,
    ) -> Result<Action, ReconcilerError> {
        let config = self.config.read().await.clone();
        let id = application.application_id();
        let zone_id = config.runtime.zone_id.as_str();

        if application.is_being_deleted() {
            return self.finalize(application, &config).await;
        }

        if !application.has_finalizer(FINALIZER_NAME) {
            let mut finalizers = application.metadata.finalizers.clone().unwrap_or_default();
            finalizers.push(FINALIZER_NAME.to_string());
            self.store
                .patch_finalizers(&id, finalizers)
                .await
                .map_err(|e| ReconcilerError::Finalizer(format!("adding finalizer to {id}: {e}")))?;
            debug!(application = %id, "Finalizer added");
        }

        let present = self
            .applications
            .load_local_application(application)
            .await?
            .as_ref()
            .is_some_and(LocalApplication::is_present);
        let base = application.status_or_default();
        if !present && !is_relevant(&base, zone_id) {
            debug!(application = %id, zone = zone_id, "Application is not placed in this zone");
            return Ok(Action::await_change());
        }

        let current_job = self.jobs.get_current(&id);
        let factory = self.job_factory(&config);
        let result = derive_new_status(application, present, current_job.as_deref(), &factory);

        if let Some(desired) = result.status {
            if !self.write_status(application, &base, desired, &config).await? {
                info!(
                    application = %id,
                    zone = zone_id,
                    "Application claimed by another zone, skipping jobs"
                );
                return Ok(Action::requeue(config.reconcile_requeue_interval));
            }
        }

        let NextJobs { to_add, to_remove } = result.jobs;
        if let Some(job_type) = to_remove {
            if self.jobs.stop_if_type(&id, job_type) {
                info!(application = %id, job = %job_type, "Job stopped");
            }
        }
        if let Some(job) = to_add {
            self.jobs.stop(&id);
            self.jobs.execute(job);
        }

        if self.jobs.get_current(&id).is_some() {
            Ok(Action::requeue(config.reconcile_requeue_interval))
        } else {
            Ok(Action::await_change())
        }
    }

    /// Merge `desired` into the stored status
    ///
    /// Returns false when another zone owns the application by now, in which
    /// case nothing was written.
    async fn write_status(
        &self,
        application: &AnyApplication,
        base: &AnyApplicationStatus,
        desired: AnyApplicationStatus,
        config: &ControllerConfig,
    ) -> Result<bool, ReconcilerError> {
        let updater = StatusUpdater::new(
            Arc::clone(&self.store),
            Arc::clone(&self.events),
            application.application_id(),
            config.runtime.zone_id.as_str(),
            config.status_update_retries,
        );
        let mut lost = false;
        let written = updater
            .update_status(|stored, zone_id| {
                lost = is_ownership_lost(stored, &desired, base, zone_id);
                let previous = stored.state;
                if !merge_status(stored, &desired, base, zone_id) {
                    return None;
                }
                let msg = if stored.state == previous {
                    format!("Status of zone '{zone_id}' updated")
                } else {
                    format!("Global state changed to '{}'", stored.state)
                };
                Some(Event::global(msg))
            })
            .await?;

        if let Some(state) = written.and_then(|app| app.status).map(|status| status.state) {
            if state != base.state {
                metrics::increment_global_state_transitions(state.as_str());
                info!(
                    application = %updater.application_id(),
                    "🔄 Global state {} -> {}",
                    base.state,
                    state
                );
            }
        }
        Ok(!lost)
    }

    async fn finalize(
        &self,
        application: &AnyApplication,
        config: &ControllerConfig,
    ) -> Result<Action, ReconcilerError> {
        let id = application.application_id();
        if self.jobs.stop(&id) {
            debug!(application = %id, "Stopped job of deleted application");
        }
        if !application.has_finalizer(FINALIZER_NAME) {
            return Ok(Action::await_change());
        }

        let results = self.applications.cleanup(application).await?;
        if DeleteResult::any_present(&results) {
            info!(
                application = %id,
                "Waiting for resources to be removed: {}",
                DeleteResult::summary(&results)
            );
            return Ok(Action::requeue(config.reconcile_requeue_interval));
        }

        let finalizers: Vec<String> = application
            .metadata
            .finalizers
            .iter()
            .flatten()
            .filter(|f| f.as_str() != FINALIZER_NAME)
            .cloned()
            .collect();
        self.store
            .patch_finalizers(&id, finalizers)
            .await
            .map_err(|e| ReconcilerError::Finalizer(format!("removing finalizer from {id}: {e}")))?;
        info!(application = %id, "✅ Resources removed, finalizer released");
        Ok(Action::await_change())
    }
}
