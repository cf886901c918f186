//! Collaborators and cancellation shared by every job.

use super::JobStatus;
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::controller::events::Event;
use crate::controller::status::StatusUpdater;
use crate::controller::sync::Applications;
use crate::crd::{Condition, ConditionType};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::warn;

/// Cancellation signal handed to a running job
///
/// Fires once the registry entry owning the sender calls `stop`. A dropped
/// sender (the entry was replaced without a stop) never fires.
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Sender and receiving side of a fresh signal
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self::new(receiver))
    }

    /// A signal that never fires
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Race `future` against cancellation, `None` when cancelled first
    pub async fn run<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

/// Interval whose first tick is one period away
pub fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Everything a job needs besides its own state
#[derive(Debug, Clone)]
pub struct JobContext {
    pub updater: StatusUpdater,
    pub applications: Arc<dyn Applications>,
    pub clock: Arc<dyn Clock>,
    pub runtime: RuntimeConfig,
}

impl JobContext {
    pub fn zone_id(&self) -> &str {
        &self.runtime.zone_id
    }

    /// Condition of the given type for this zone, stamped now
    pub(crate) fn condition(&self, condition_type: ConditionType, status: &str) -> Condition {
        Condition::new(condition_type, self.zone_id(), status, self.clock.now_rfc3339())
    }

    /// Wall-clock instant `timeout` from now
    pub(crate) fn deadline(&self, timeout: Duration) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(365));
        self.clock.now() + timeout
    }

    pub(crate) fn is_past(&self, deadline: DateTime<Utc>) -> bool {
        self.clock.now() >= deadline
    }

    /// Record `condition` as the job's status and publish it
    ///
    /// Nothing is written once the job is cancelled. Write failures are logged;
    /// the next reconciliation picks the snapshot up from the running job.
    pub(crate) async fn report(
        &self,
        status: &JobStatus,
        cancel: &Cancellation,
        condition: Condition,
        remove: &[ConditionType],
    ) {
        status.set(condition.clone());
        if cancel.is_cancelled() {
            return;
        }
        let msg = if condition.msg.is_empty() {
            format!("{} state changed to '{}'", condition.r#type, condition.status)
        } else {
            condition.msg.clone()
        };
        let update = self
            .updater
            .update_condition(Event::local(msg), condition, remove);
        if let Some(Err(e)) = cancel.run(update).await {
            warn!(
                application = %self.updater.application_id(),
                zone = %self.zone_id(),
                "Failed to write job status: {}",
                e
            );
        }
    }
}
