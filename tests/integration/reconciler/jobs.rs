//! Job registry and job behaviour driven against the scripted zone.

use super::common::{application, FakeApplications, Harness, ZONE};
use anyapplication_controller::config::RuntimeConfig;
use anyapplication_controller::controller::events::EventSink;
use anyapplication_controller::controller::job::{JobFactory, JobType};
use anyapplication_controller::controller::store::ApplicationStore;
use anyapplication_controller::controller::sync::{Applications, HealthStatus};
use anyapplication_controller::crd::{
    AnyApplication, AnyApplicationStatus, ConditionType, GlobalState, HealthStatusCode, Placement,
    PlacementStrategy,
};
use std::sync::Arc;
use std::time::Duration;

fn factory(harness: &Harness) -> JobFactory {
    JobFactory::new(
        Arc::clone(&harness.store) as Arc<dyn ApplicationStore>,
        Arc::clone(&harness.events) as Arc<dyn EventSink>,
        Arc::clone(&harness.applications) as Arc<dyn Applications>,
        Arc::new(harness.clock.clone()),
        RuntimeConfig::for_zone(ZONE),
        5,
    )
}

fn operational() -> AnyApplication {
    application(
        PlacementStrategy::Local,
        AnyApplicationStatus {
            state: GlobalState::Operational,
            owner: ZONE.to_string(),
            placements: vec![Placement::zone(ZONE)],
            zones: Vec::new(),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn test_registry_holds_one_job_per_application() {
    let harness = Harness::new(FakeApplications::running("1.0.0"));
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();
    let factory = factory(&harness);
    let jobs = harness.reconciler.jobs();

    let mut last = None;
    for _ in 0..3 {
        jobs.stop(&id);
        last = Some(jobs.execute(factory.create(JobType::LocalOperation, &app)));
    }

    assert_eq!(jobs.len(), 1);
    let current = jobs.get_current(&id).unwrap();
    assert_eq!(current.job_id(), last.unwrap().job_id());

    assert!(!jobs.stop_if_type(&id, JobType::Deploy));
    assert_eq!(jobs.len(), 1);
    assert!(jobs.stop_if_type(&id, JobType::LocalOperation));
    assert!(jobs.get_current(&id).is_none());
    assert!(!jobs.stop(&id));
}

#[tokio::test(start_paused = true)]
async fn test_finished_job_keeps_newer_entry() {
    let harness = Harness::new(FakeApplications::running("1.0.0"));
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();
    let factory = factory(&harness);
    let jobs = harness.reconciler.jobs();

    // placement finishes after one write, operation keeps polling
    jobs.execute(factory.create(JobType::LocalPlacement, &app));
    let operation = jobs.execute(factory.create(JobType::LocalOperation, &app));
    tokio::time::sleep(Duration::from_secs(1)).await;

    let current = jobs.get_current(&id).unwrap();
    assert_eq!(current.job_id(), operation.job_id());
    jobs.stop_all();
    assert!(jobs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_operation_stops_on_terminal_health() {
    let zone = FakeApplications::running("1.0.0");
    zone.set_health(HealthStatus::new(HealthStatusCode::Degraded, "pod crash looping"));
    let harness = Harness::new(zone);
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();

    harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::LocalOperation, &app));
    harness.wait_for_jobs().await;

    let local = harness.condition(&id, ConditionType::Local).unwrap();
    assert_eq!(local.status, "Degraded");
    assert_eq!(local.reason, "HealthCheck");
    assert_eq!(local.msg, "pod crash looping");
}

#[tokio::test(start_paused = true)]
async fn test_deploy_times_out() {
    let zone = FakeApplications::new();
    zone.script_sync(std::iter::repeat_n(Ok(false), 10));
    let harness = Harness::new(zone);
    let mut app = operational();
    app.spec.recover_strategy.max_retries = 1;
    let id = harness.insert(app);
    let app = harness.store.snapshot(&id).unwrap();

    let job = harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::Deploy, &app));
    assert_eq!(job.status().status, "Pull");
    assert_eq!(job.status().retry_attempt, 1);

    // first sync runs immediately, the deadline is checked on the next one
    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.clock.advance(Duration::from_secs(301));
    harness.wait_for_jobs().await;

    let deployment = harness.condition(&id, ConditionType::Deployment).unwrap();
    assert_eq!(deployment.status, "Failure");
    assert_eq!(deployment.reason, "Timeout");
    assert!(
        deployment.msg.starts_with("Deployment failure: Deployment timed out after"),
        "{}",
        deployment.msg
    );
    assert_eq!(harness.applications.sync_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_job_writes_nothing() {
    let zone = FakeApplications::new();
    zone.script_sync(std::iter::repeat_n(Ok(false), 10));
    let harness = Harness::new(zone);
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();
    let jobs = harness.reconciler.jobs();

    jobs.execute(factory(&harness).create(JobType::Deploy, &app));
    tokio::time::sleep(Duration::from_secs(1)).await;
    let writes = harness.store.status_writes();
    assert!(jobs.stop(&id));
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(harness.store.status_writes(), writes);
    assert_eq!(harness.applications.sync_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_undeploy_retries_then_fails() {
    let zone = FakeApplications::running("1.0.0");
    zone.script_cleanup((1..=3).map(|n| Err(format!("api unavailable {n}"))));
    let harness = Harness::new(zone);
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();

    harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::Undeploy, &app));
    harness.wait_for_jobs().await;

    assert_eq!(harness.applications.cleanup_calls(), 3);
    let messages = harness.events.messages();
    let retries: Vec<&String> = messages
        .iter()
        .filter(|msg| msg.contains("Retrying undeployment"))
        .collect();
    assert_eq!(retries.len(), 2);
    assert!(retries[0].starts_with("Undeploy failure: "), "{}", retries[0]);
    assert!(retries[0].contains("api unavailable 1"), "{}", retries[0]);
    assert!(retries[0].ends_with("Retrying undeployment (attempt 2 of 3)."), "{}", retries[0]);
    assert!(retries[1].ends_with("Retrying undeployment (attempt 3 of 3)."), "{}", retries[1]);

    let undeployment = harness.condition(&id, ConditionType::Undeployment).unwrap();
    assert_eq!(undeployment.status, "Failure");
    assert_eq!(undeployment.reason, "UndeployError");
    assert_eq!(undeployment.retry_attempt, 3);
    assert_eq!(undeployment.msg, "Undeploy failure: Failure after 3 attempts.");
    assert!(harness.applications.is_present());
}

#[tokio::test(start_paused = true)]
async fn test_undeploy_timeout_starts_next_attempt() {
    let zone = FakeApplications::running("1.0.0");
    // resources linger for two rounds, then the delete goes through
    zone.script_cleanup([Ok(false), Ok(false)]);
    let harness = Harness::new(zone);
    let mut app = operational();
    app.spec.recover_strategy.max_retries = 2;
    let id = harness.insert(app);
    let app = harness.store.snapshot(&id).unwrap();

    harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::Undeploy, &app));
    tokio::time::sleep(Duration::from_secs(1)).await;
    harness.clock.advance(Duration::from_secs(301));
    harness.wait_for_jobs().await;

    let messages = harness.events.messages();
    assert!(
        messages.contains(
            &"Undeploy failure: Undeploy timed out after 5m0s. Retrying undeployment (attempt 2 of 2)."
                .to_string()
        ),
        "{messages:?}"
    );
    let undeployment = harness.condition(&id, ConditionType::Undeployment).unwrap();
    assert_eq!(undeployment.status, "Done");
    assert_eq!(undeployment.retry_attempt, 2);
    assert_eq!(harness.applications.cleanup_calls(), 3);
    assert!(!harness.applications.is_present());
}

#[tokio::test(start_paused = true)]
async fn test_relocation_reports_done() {
    let harness = Harness::new(FakeApplications::new());
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();

    let job = harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::Relocate, &app));
    assert_eq!(job.status().status, "Pull");
    harness.wait_for_jobs().await;

    let relocation = harness.condition(&id, ConditionType::Relocation).unwrap();
    assert_eq!(relocation.status, "Done");
    assert_eq!(relocation.msg, "Relocation state changed to 'Done'.");
    assert!(harness.applications.is_present());
}

#[tokio::test(start_paused = true)]
async fn test_relocation_reports_sync_failure() {
    let zone = FakeApplications::new();
    zone.script_sync([Err("registry unavailable".to_string())]);
    let harness = Harness::new(zone);
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();

    harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::Relocate, &app));
    harness.wait_for_jobs().await;

    let relocation = harness.condition(&id, ConditionType::Relocation).unwrap();
    assert_eq!(relocation.status, "Failure");
    assert_eq!(relocation.reason, "SyncError");
    assert!(relocation.msg.starts_with("Relocation failure: "), "{}", relocation.msg);
    assert!(relocation.msg.contains("registry unavailable"), "{}", relocation.msg);
    assert_eq!(harness.applications.sync_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ownership_transfer_reports_success() {
    let harness = Harness::new(FakeApplications::new());
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();

    let job = harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::OwnershipTransfer, &app));
    assert_eq!(job.status().status, "Pulling");
    harness.wait_for_jobs().await;

    let transfer = harness.condition(&id, ConditionType::OwnershipTransfer).unwrap();
    assert_eq!(transfer.status, "Success");
    assert_eq!(transfer.msg, "Ownership transfer completed");
}

#[tokio::test(start_paused = true)]
async fn test_ownership_transfer_reports_failure() {
    let zone = FakeApplications::new();
    zone.script_sync([Ok(false)]);
    let harness = Harness::new(zone);
    let id = harness.insert(operational());
    let app = harness.store.snapshot(&id).unwrap();

    harness
        .reconciler
        .jobs()
        .execute(factory(&harness).create(JobType::OwnershipTransfer, &app));
    harness.wait_for_jobs().await;

    let transfer = harness.condition(&id, ConditionType::OwnershipTransfer).unwrap();
    assert_eq!(transfer.status, "Failure");
    assert!(
        transfer.msg.starts_with("Ownership transfer failure: "),
        "{}",
        transfer.msg
    );
    assert!(!harness.applications.is_present());
}
