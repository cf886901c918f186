//! Finalizer handling of deleted applications.

use super::common::{application, FakeApplications, Harness};
use anyapplication_controller::constants::FINALIZER_NAME;
use anyapplication_controller::crd::{
    AnyApplication, AnyApplicationStatus, Placement, PlacementStrategy,
};
use kube_runtime::controller::Action;

fn deleted(mut application: AnyApplication, finalizers: &[&str]) -> AnyApplication {
    application.metadata.finalizers = Some(finalizers.iter().map(ToString::to_string).collect());
    application.metadata.deletion_timestamp =
        Some(serde_json::from_value(serde_json::json!("2025-06-01T00:00:00Z")).unwrap());
    application
}

#[tokio::test]
async fn test_finalizer_is_added() {
    let harness = Harness::new(FakeApplications::new());
    let id = harness.insert(application(
        PlacementStrategy::Global,
        AnyApplicationStatus::default(),
    ));

    harness.reconcile(&id).await;

    let stored = harness.store.snapshot(&id).unwrap();
    assert!(stored.has_finalizer(FINALIZER_NAME));
}

#[tokio::test]
async fn test_deleted_application_is_cleaned_up_and_released() {
    let harness = Harness::new(FakeApplications::running("1.0.0"));
    let id = harness.insert(deleted(
        application(PlacementStrategy::Local, AnyApplicationStatus::default()),
        &[FINALIZER_NAME],
    ));

    let action = harness.reconcile(&id).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(harness.applications.cleanup_calls(), 1);
    assert!(!harness.applications.is_present());
    assert!(harness.store.snapshot(&id).is_none());
}

#[tokio::test]
async fn test_foreign_finalizers_are_kept() {
    let harness = Harness::new(FakeApplications::running("1.0.0"));
    let id = harness.insert(deleted(
        application(PlacementStrategy::Local, AnyApplicationStatus::default()),
        &["other.example.com/finalizer", FINALIZER_NAME],
    ));

    harness.reconcile(&id).await;

    let stored = harness.store.snapshot(&id).unwrap();
    assert_eq!(
        stored.metadata.finalizers,
        Some(vec!["other.example.com/finalizer".to_string()])
    );
}

#[tokio::test]
async fn test_deleted_application_without_finalizer_is_left_alone() {
    let harness = Harness::new(FakeApplications::running("1.0.0"));
    let id = harness.insert(deleted(
        application(PlacementStrategy::Local, AnyApplicationStatus::default()),
        &["other.example.com/finalizer"],
    ));

    let action = harness.reconcile(&id).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(harness.applications.cleanup_calls(), 0);
    assert!(harness.applications.is_present());
}

#[tokio::test(start_paused = true)]
async fn test_deletion_stops_running_job() {
    let harness = Harness::new(FakeApplications::new());
    // a sync that never completes keeps the deploy job running
    harness
        .applications
        .script_sync(std::iter::repeat_n(Ok(false), 100));
    let id = harness.insert(application(
        PlacementStrategy::Global,
        AnyApplicationStatus {
            placements: vec![Placement::zone(super::common::ZONE)],
            ..AnyApplicationStatus::default()
        },
    ));
    harness.reconcile(&id).await;
    assert!(harness.reconciler.jobs().get_current(&id).is_some());

    let current = harness.store.snapshot(&id).unwrap();
    harness.store.insert(deleted(current, &[FINALIZER_NAME]));
    harness.reconcile(&id).await;

    assert!(harness.reconciler.jobs().is_empty());
    assert!(harness.store.snapshot(&id).is_none());
}
