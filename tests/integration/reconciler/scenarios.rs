//! Lifecycle scenarios of a single zone that owns the application.

use super::common::{application, condition, FakeApplications, Harness, ZONE};
use anyapplication_controller::controller::job::JobType;
use anyapplication_controller::crd::{
    AnyApplicationStatus, ApplicationId, ConditionType, GlobalState, Placement, PlacementStrategy,
};

fn owned(state: GlobalState, placements: &[&str]) -> AnyApplicationStatus {
    AnyApplicationStatus {
        state,
        owner: ZONE.to_string(),
        placements: placements.iter().map(|zone| Placement::zone(*zone)).collect(),
        zones: Vec::new(),
    }
}

fn running_job(harness: &Harness, id: &ApplicationId) -> Option<JobType> {
    harness
        .reconciler
        .jobs()
        .get_current(id)
        .map(|job| job.job_type())
}

#[tokio::test(start_paused = true)]
async fn test_new_application_is_placed_locally() {
    let harness = Harness::new(FakeApplications::new());
    let id = harness.insert(application(
        PlacementStrategy::Local,
        AnyApplicationStatus::default(),
    ));

    harness.reconcile(&id).await;

    let status = harness.status(&id);
    assert_eq!(status.owner, ZONE);
    assert!(status.placements.is_empty());
    let placement = harness.condition(&id, ConditionType::Placement).unwrap();
    assert_eq!(placement.status, "InProgress");
    assert_eq!(running_job(&harness, &id), Some(JobType::LocalPlacement));

    harness.wait_for_jobs().await;
    let status = harness.status(&id);
    assert_eq!(status.placements, vec![Placement::zone(ZONE)]);
    let placement = harness.condition(&id, ConditionType::Placement).unwrap();
    assert_eq!(placement.status, "Done");
}

#[tokio::test(start_paused = true)]
async fn test_placed_application_is_deployed() {
    let harness = Harness::new(FakeApplications::new());
    let id = harness.insert(application(
        PlacementStrategy::Global,
        AnyApplicationStatus {
            placements: vec![Placement::zone(ZONE)],
            ..AnyApplicationStatus::default()
        },
    ));

    harness.reconcile(&id).await;

    let deployment = harness.condition(&id, ConditionType::Deployment).unwrap();
    assert_eq!(deployment.status, "Pull");
    assert_eq!(running_job(&harness, &id), Some(JobType::Deploy));

    harness.wait_for_jobs().await;
    let deployment = harness.condition(&id, ConditionType::Deployment).unwrap();
    assert_eq!(deployment.status, "Done");
    assert!(harness.applications.is_present());
}

#[tokio::test(start_paused = true)]
async fn test_deployed_application_is_operated() {
    let harness = Harness::new(FakeApplications::running("1.0.0"));
    let mut status = owned(GlobalState::Relocation, &[ZONE]);
    status.add_or_update(condition(ConditionType::Deployment, "Done"), ZONE);
    let id = harness.insert(application(PlacementStrategy::Local, status));

    harness.reconcile(&id).await;

    assert_eq!(harness.status(&id).state, GlobalState::Operational);
    let local = harness.condition(&id, ConditionType::Local).unwrap();
    assert_eq!(local.status, "Progressing");
    assert_eq!(running_job(&harness, &id), Some(JobType::LocalOperation));

    harness
        .wait_until(|h| {
            h.condition(&id, ConditionType::Local)
                .is_some_and(|c| c.status == "Healthy")
        })
        .await;
    harness.reconciler.stop_all_jobs();
}

#[tokio::test(start_paused = true)]
async fn test_placement_moved_away_undeploys() {
    let harness = Harness::new(FakeApplications::running("1.0.0"));
    let mut status = owned(GlobalState::Operational, &["other-zone"]);
    status.add_or_update(condition(ConditionType::Deployment, "Done"), ZONE);
    status.add_or_update(condition(ConditionType::Local, "Progressing"), ZONE);
    let id = harness.insert(application(PlacementStrategy::Global, status));

    harness.reconcile(&id).await;

    let undeployment = harness.condition(&id, ConditionType::Undeployment).unwrap();
    assert_eq!(undeployment.status, "Undeploy");
    // the Local condition stays until the undeployment completes
    assert!(harness.condition(&id, ConditionType::Local).is_some());
    assert_eq!(running_job(&harness, &id), Some(JobType::Undeploy));

    harness.wait_for_jobs().await;
    assert!(!harness.applications.is_present());
    let undeployment = harness.condition(&id, ConditionType::Undeployment).unwrap();
    assert_eq!(undeployment.status, "Done");
    assert!(harness.condition(&id, ConditionType::Local).is_none());
    assert!(harness.condition(&id, ConditionType::Deployment).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deploy_retries_then_fails() {
    let zone = FakeApplications::new();
    zone.script_sync((1..=3).map(|n| Err(format!("render error {n}"))));
    let harness = Harness::new(zone);
    let id = harness.insert(application(
        PlacementStrategy::Local,
        owned(GlobalState::Relocation, &[ZONE]),
    ));

    harness.reconcile(&id).await;
    harness.wait_for_jobs().await;

    assert_eq!(harness.applications.sync_calls(), 3);
    let messages = harness.events.messages();
    let retries: Vec<&String> = messages
        .iter()
        .filter(|msg| msg.contains("Retrying deployment"))
        .collect();
    assert_eq!(
        retries,
        vec![
            "Deployment failure: Retrying deployment (attempt 2 of 3)",
            "Deployment failure: Retrying deployment (attempt 3 of 3)",
        ]
    );
    let deployment = harness.condition(&id, ConditionType::Deployment).unwrap();
    assert_eq!(deployment.status, "Failure");
    assert_eq!(deployment.retry_attempt, 3);
    assert!(deployment.msg.contains("render error 3"), "{}", deployment.msg);

    // a failing zone beyond the tolerance moves the application to Failure
    harness.reconcile(&id).await;
    assert_eq!(harness.status(&id).state, GlobalState::Failure);
}

#[tokio::test(start_paused = true)]
async fn test_full_local_lifecycle() {
    let harness = Harness::new(FakeApplications::new());
    let id = harness.insert(application(
        PlacementStrategy::Local,
        AnyApplicationStatus::default(),
    ));

    harness.reconcile(&id).await;
    harness.wait_for_jobs().await;
    assert_eq!(harness.status(&id).state, GlobalState::Placement);

    harness.reconcile(&id).await;
    assert_eq!(harness.status(&id).state, GlobalState::Relocation);
    harness.wait_for_jobs().await;

    harness.reconcile(&id).await;
    assert_eq!(harness.status(&id).state, GlobalState::Operational);
    assert_eq!(running_job(&harness, &id), Some(JobType::LocalOperation));

    let messages = harness.events.messages();
    assert!(messages.contains(&"Global state changed to 'Operational'".to_string()));
    harness.reconciler.stop_all_jobs();
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_application_is_ignored() {
    let harness = Harness::new(FakeApplications::new());
    let id = harness.insert(application(
        PlacementStrategy::Global,
        AnyApplicationStatus {
            state: GlobalState::Operational,
            owner: "other-zone".to_string(),
            placements: vec![Placement::zone("other-zone")],
            zones: Vec::new(),
        },
    ));
    let before = harness.status(&id);

    harness.reconcile(&id).await;

    assert_eq!(harness.status(&id), before);
    assert!(harness.reconciler.jobs().is_empty());
    assert_eq!(harness.store.status_writes(), 0);
}
