//! Optimistic-concurrency status writes from several zones.

use super::common::{application, FIXTURE_TIME};
use anyapplication_controller::controller::events::{Event, EventSink, RecordingEvents};
use anyapplication_controller::controller::status::StatusUpdater;
use anyapplication_controller::controller::store::{ApplicationStore, InMemoryApplicationStore};
use anyapplication_controller::crd::{
    AnyApplicationStatus, ApplicationId, Condition, ConditionType, PlacementStrategy,
};
use std::collections::HashSet;
use std::sync::Arc;

struct Fixture {
    store: Arc<InMemoryApplicationStore>,
    events: Arc<RecordingEvents>,
    id: ApplicationId,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(InMemoryApplicationStore::new());
        let id = store
            .insert(application(
                PlacementStrategy::Global,
                AnyApplicationStatus::default(),
            ))
            .application_id();
        Self {
            store,
            events: Arc::new(RecordingEvents::new()),
            id,
        }
    }

    fn updater(&self, zone: &str, retries: u32) -> StatusUpdater {
        StatusUpdater::new(
            Arc::clone(&self.store) as Arc<dyn ApplicationStore>,
            Arc::clone(&self.events) as Arc<dyn EventSink>,
            self.id.clone(),
            zone,
            retries,
        )
    }

    fn status(&self) -> AnyApplicationStatus {
        self.store.snapshot(&self.id).unwrap().status_or_default()
    }
}

fn deployed(zone: &str) -> Condition {
    Condition::new(ConditionType::Deployment, zone, "Done", FIXTURE_TIME)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_zones_all_land() {
    let fixture = Fixture::new();
    fixture.store.inject_conflicts(3);
    let zones: Vec<String> = (1..=5).map(|n| format!("zone-{n}")).collect();

    let writers: Vec<_> = zones
        .iter()
        .map(|zone| {
            let updater = fixture.updater(zone, 10);
            let condition = deployed(zone);
            tokio::spawn(async move {
                updater
                    .update_condition(Event::local("deployed"), condition, &[])
                    .await
            })
        })
        .collect();
    for writer in writers {
        let written = writer.await.unwrap().unwrap();
        assert!(written.is_some());
    }

    let status = fixture.status();
    assert_eq!(status.zones.len(), zones.len());
    for zone in &zones {
        let zone_status = status.get_status_for(zone).unwrap();
        assert!(zone_status.zone_version > 0);
        assert!(zone_status.find_condition(ConditionType::Deployment).is_some());
    }
    let versions: HashSet<i64> = status.zones.iter().map(|z| z.zone_version).collect();
    assert_eq!(versions.len(), zones.len());
    assert_eq!(fixture.store.status_writes(), 5);
    assert_eq!(fixture.events.messages().len(), 5);
}

#[tokio::test]
async fn test_retries_exhausted_reports_conflict() {
    let fixture = Fixture::new();
    fixture.store.inject_conflicts(100);

    let err = fixture
        .updater("zone", 3)
        .update_condition(Event::local("deployed"), deployed("zone"), &[])
        .await
        .unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(fixture.store.status_writes(), 0);
    assert!(fixture.events.messages().is_empty());
}

#[tokio::test]
async fn test_unchanged_status_is_not_written() {
    let fixture = Fixture::new();
    let updater = fixture.updater("zone", 3);
    updater
        .update_condition(Event::local("deployed"), deployed("zone"), &[])
        .await
        .unwrap();
    let version = fixture.status().get_status_for("zone").unwrap().zone_version;

    // same observation with a later timestamp
    let repeated = Condition::new(ConditionType::Deployment, "zone", "Done", "2025-02-01T00:00:00Z");
    let written = updater
        .update_condition(Event::local("deployed"), repeated, &[])
        .await
        .unwrap();

    assert!(written.is_none());
    assert_eq!(fixture.store.status_writes(), 1);
    assert_eq!(
        fixture.status().get_status_for("zone").unwrap().zone_version,
        version
    );
}

#[tokio::test]
async fn test_superseded_conditions_are_removed() {
    let fixture = Fixture::new();
    let updater = fixture.updater("zone", 3);
    updater
        .update_condition(
            Event::local("healthy"),
            Condition::new(ConditionType::Local, "zone", "Healthy", FIXTURE_TIME),
            &[],
        )
        .await
        .unwrap();

    updater
        .update_condition(
            Event::local("undeploying"),
            Condition::new(ConditionType::Undeployment, "zone", "Undeploy", FIXTURE_TIME),
            &[ConditionType::Local],
        )
        .await
        .unwrap();

    let status = fixture.status();
    assert!(status.find_condition(ConditionType::Local, "zone").is_none());
    assert!(status.find_condition(ConditionType::Undeployment, "zone").is_some());
    assert_eq!(fixture.events.messages(), vec!["healthy", "undeploying"]);
}

#[tokio::test]
async fn test_deleted_application_ends_update() {
    let fixture = Fixture::new();
    fixture.store.remove(&fixture.id);

    let written = fixture
        .updater("zone", 3)
        .update_condition(Event::local("deployed"), deployed("zone"), &[])
        .await
        .unwrap();

    assert!(written.is_none());
}
