//! # Status Updater
//!
//! Read, mutate, conditionally write, retry on conflict.
//!
//! - A mutation that reports no change performs no write and no version bump.
//! - An accepted change bumps the writing zone's version exactly once.
//! - A deleted application ends the loop without error.

use crate::controller::events::{Event, EventSink};
use crate::controller::store::{ApplicationStore, StoreError};
use crate::crd::{AnyApplication, AnyApplicationStatus, ApplicationId, Condition, ConditionType};
use crate::observability::metrics;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StatusUpdater {
    store: Arc<dyn ApplicationStore>,
    events: Arc<dyn EventSink>,
    application_id: ApplicationId,
    zone_id: String,
    retries: u32,
}

impl StatusUpdater {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        events: Arc<dyn EventSink>,
        application_id: ApplicationId,
        zone_id: impl Into<String>,
        retries: u32,
    ) -> Self {
        Self {
            store,
            events,
            application_id,
            zone_id: zone_id.into(),
            retries: retries.max(1),
        }
    }

    /// Apply `mutate` to the latest status and write it if it reports a change
    ///
    /// `mutate` receives the status and this zone's id and returns the event to
    /// publish when it changed something, `None` otherwise. It may run several
    /// times, once per conflicting attempt.
    ///
    /// Returns the written application, or `None` when nothing was written.
    pub async fn update_status<F>(&self, mut mutate: F) -> Result<Option<AnyApplication>, StoreError>
    where
        F: FnMut(&mut AnyApplicationStatus, &str) -> Option<Event> + Send,
    {
        for attempt in 1..=self.retries {
            let Some(mut application) = self.store.get(&self.application_id).await? else {
                debug!(application = %self.application_id, "Application is gone, skipping status update");
                return Ok(None);
            };

            let mut status = application.status_or_default();
            let Some(event) = mutate(&mut status, &self.zone_id) else {
                return Ok(None);
            };

            status.get_or_create_status_for(&self.zone_id);
            status.increment_zone_version(
                &self.zone_id,
                application.metadata.resource_version.as_deref(),
            );
            application.status = Some(status);

            match self.store.update_status(&application).await {
                Ok(updated) => {
                    metrics::increment_status_updates();
                    if let Some(status) = &updated.status {
                        debug!(
                            application = %self.application_id,
                            zone = %self.zone_id,
                            "Status updated: {}",
                            status.summary()
                        );
                    }
                    self.events.publish(&updated, &event).await;
                    return Ok(Some(updated));
                }
                Err(StoreError::Conflict(_)) => {
                    metrics::increment_status_update_conflicts();
                    debug!(
                        application = %self.application_id,
                        attempt,
                        "Conflict writing status, retrying from a fresh read"
                    );
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(application = %self.application_id, "Application deleted during status update");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            application = %self.application_id,
            "Status update gave up after {} conflicting attempts",
            self.retries
        );
        Err(StoreError::Conflict(self.application_id.clone()))
    }

    /// Upsert `condition` into this zone and drop the superseded condition types
    pub async fn update_condition(
        &self,
        event: Event,
        condition: Condition,
        remove: &[ConditionType],
    ) -> Result<Option<AnyApplication>, StoreError> {
        self.update_status(|status, zone_id| {
            let mut changed = status.add_or_update(condition.clone(), zone_id);
            for condition_type in remove {
                changed |= status.remove(*condition_type, zone_id);
            }
            changed.then(|| event.clone())
        })
        .await
    }

    pub fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }
}
