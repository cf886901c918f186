//! Zones racing to claim an application that has no owner yet.

use super::common::{application, FakeApplications, Harness};
use anyapplication_controller::controller::reconciler::reconcile;
use anyapplication_controller::controller::store::InMemoryApplicationStore;
use anyapplication_controller::crd::{AnyApplicationStatus, GlobalState, Placement, PlacementStrategy};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_only_the_first_claim_places_the_application() {
    let store = Arc::new(InMemoryApplicationStore::new());
    let zone_a = Harness::in_zone("zone-a", Arc::clone(&store), FakeApplications::new());
    let zone_b = Harness::in_zone("zone-b", Arc::clone(&store), FakeApplications::new());
    let id = zone_a.insert(application(
        PlacementStrategy::Local,
        AnyApplicationStatus::default(),
    ));
    // both zones received the same unclaimed snapshot
    let snapshot = Arc::new(store.snapshot(&id).unwrap());

    reconcile(Arc::clone(&snapshot), Arc::clone(&zone_a.reconciler))
        .await
        .unwrap();
    let action = reconcile(snapshot, Arc::clone(&zone_b.reconciler))
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(1)));
    assert!(zone_b.reconciler.jobs().is_empty());
    assert!(zone_b.events.messages().is_empty());

    zone_a.wait_for_jobs().await;
    let status = zone_a.status(&id);
    assert_eq!(status.owner, "zone-a");
    assert_eq!(status.state, GlobalState::Placement);
    assert_eq!(status.placements, vec![Placement::zone("zone-a")]);
    assert!(status.get_status_for("zone-a").is_some());
    assert!(status.get_status_for("zone-b").is_none());

    // the losing zone stays out once it sees the owner
    zone_b.reconcile(&id).await;
    assert!(zone_b.reconciler.jobs().is_empty());
    assert!(zone_b.status(&id).get_status_for("zone-b").is_none());
}
