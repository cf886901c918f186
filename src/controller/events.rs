//! # Events
//!
//! Notification events emitted after every accepted status write.

use crate::constants::FIELD_MANAGER;
use crate::crd::{AnyApplication, ApplicationId};
use async_trait::async_trait;
use kube::runtime::events::{Event as KubeEvent, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Reason of events written by jobs
pub const LOCAL_STATE_CHANGE_REASON: &str = "Local state change";
/// Reason of events written by the reconciler
pub const GLOBAL_STATE_CHANGE_REASON: &str = "Global state change";

/// Kubernetes caps the note field at 1KiB
const MAX_NOTE_LENGTH: usize = 1023;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub reason: String,
    pub msg: String,
}

impl Event {
    pub fn local(msg: impl Into<String>) -> Self {
        Self {
            reason: LOCAL_STATE_CHANGE_REASON.to_string(),
            msg: msg.into(),
        }
    }

    pub fn global(msg: impl Into<String>) -> Self {
        Self {
            reason: GLOBAL_STATE_CHANGE_REASON.to_string(),
            msg: msg.into(),
        }
    }
}

/// Destination of application events
///
/// Publishing is best effort: failures are logged, never returned.
#[async_trait]
pub trait EventSink: Send + Sync + fmt::Debug {
    async fn publish(&self, application: &AnyApplication, event: &Event);
}

/// Publishes events to the Kubernetes API, attached to the application object
pub struct KubeEventSink {
    recorder: Recorder,
}

impl fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventSink").finish_non_exhaustive()
    }
}

impl KubeEventSink {
    pub fn new(client: Client, zone_id: &str) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.to_string(),
            instance: Some(zone_id.to_string()),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, application: &AnyApplication, event: &Event) {
        let mut note = event.msg.clone();
        if note.len() > MAX_NOTE_LENGTH {
            let mut end = MAX_NOTE_LENGTH;
            while !note.is_char_boundary(end) {
                end -= 1;
            }
            note.truncate(end);
        }
        let kube_event = KubeEvent {
            type_: EventType::Normal,
            reason: event.reason.clone(),
            note: Some(note),
            action: "StatusUpdate".to_string(),
            secondary: None,
        };
        let reference = application.object_ref(&());
        if let Err(e) = self.recorder.publish(&kube_event, &reference).await {
            warn!(
                application = %application.application_id(),
                "Failed to publish event '{}': {}",
                event.reason,
                e
            );
        }
    }
}

/// Keeps published events in memory
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(ApplicationId, Event)>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, oldest first
    pub fn events(&self) -> Vec<(ApplicationId, Event)> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|(_, event)| event.msg).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn publish(&self, application: &AnyApplication, event: &Event) {
        debug!(application = %application.application_id(), reason = %event.reason, "{}", event.msg);
        if let Ok(mut events) = self.events.lock() {
            events.push((application.application_id(), event.clone()));
        }
    }
}
