//! Shared fixtures: a scripted zone, an in-memory store and a reconciler wired to both.

use anyapplication_controller::clock::FakeClock;
use anyapplication_controller::config::{ControllerConfig, RuntimeConfig};
use anyapplication_controller::controller::events::{EventSink, RecordingEvents};
use anyapplication_controller::controller::reconciler::{reconcile, Reconciler};
use anyapplication_controller::controller::store::{ApplicationStore, InMemoryApplicationStore};
use anyapplication_controller::controller::sync::{
    ApplicationBundle, Applications, DeleteResult, HealthStatus, LocalApplication, ResourceKey,
    SyncError, SyncResult,
};
use anyapplication_controller::crd::{
    AnyApplication, AnyApplicationSpec, AnyApplicationStatus, ApplicationId,
    ApplicationMatcherSpec, Condition, ConditionType, HelmSelectorSpec, PlacementStrategy,
    PlacementStrategySpec, RecoverStrategySpec,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use kube_runtime::controller::Action;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const ZONE: &str = "zone";

/// Timestamp of conditions written by fixtures, before the fake clock's start
pub const FIXTURE_TIME: &str = "2025-01-01T00:00:00Z";

#[derive(Debug, Default)]
struct ZoneState {
    versions: Vec<String>,
    /// `Ok(deployed)` or `Err(message)` per sync call, `Ok(true)` once exhausted
    sync_script: VecDeque<Result<bool, String>>,
    /// `Ok(removed)` or `Err(message)` per cleanup call, `Ok(true)` once exhausted
    cleanup_script: VecDeque<Result<bool, String>>,
    health: Option<HealthStatus>,
    sync_calls: usize,
    cleanup_calls: usize,
}

/// A zone whose sync outcomes are scripted by the test
#[derive(Debug, Default)]
pub struct FakeApplications {
    state: Mutex<ZoneState>,
}

impl FakeApplications {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zone already running `version`
    pub fn running(version: &str) -> Self {
        let zone = Self::new();
        zone.state().versions.push(version.to_string());
        zone
    }

    fn state(&self) -> MutexGuard<'_, ZoneState> {
        self.state.lock().unwrap()
    }

    pub fn script_sync(&self, outcomes: impl IntoIterator<Item = Result<bool, String>>) {
        self.state().sync_script.extend(outcomes);
    }

    pub fn script_cleanup(&self, outcomes: impl IntoIterator<Item = Result<bool, String>>) {
        self.state().cleanup_script.extend(outcomes);
    }

    pub fn set_health(&self, health: HealthStatus) {
        self.state().health = Some(health);
    }

    pub fn is_present(&self) -> bool {
        !self.state().versions.is_empty()
    }

    pub fn sync_calls(&self) -> usize {
        self.state().sync_calls
    }

    pub fn cleanup_calls(&self) -> usize {
        self.state().cleanup_calls
    }

    fn health(state: &ZoneState) -> HealthStatus {
        state.health.clone().unwrap_or_else(HealthStatus::healthy)
    }
}

#[async_trait]
impl Applications for FakeApplications {
    async fn sync_version(&self, application: &AnyApplication) -> Result<SyncResult, SyncError> {
        let mut state = self.state();
        state.sync_calls += 1;
        let version = application.target_version().unwrap_or_default().to_string();
        match state.sync_script.pop_front().unwrap_or(Ok(true)) {
            Ok(deployed) => {
                if deployed && !state.versions.contains(&version) {
                    state.versions.push(version.clone());
                }
                Ok(SyncResult {
                    version,
                    deployed,
                    health: Self::health(&state),
                    resources: Vec::new(),
                })
            }
            Err(message) => Err(SyncError::Render {
                chart: "nginx".to_string(),
                version,
                message,
            }),
        }
    }

    async fn cleanup(&self, _: &AnyApplication) -> Result<Vec<DeleteResult>, SyncError> {
        let mut state = self.state();
        state.cleanup_calls += 1;
        let removed = state
            .cleanup_script
            .pop_front()
            .unwrap_or(Ok(true))
            .map_err(SyncError::Manifest)?;
        let versions = if removed {
            std::mem::take(&mut state.versions)
        } else {
            state.versions.clone()
        };
        Ok(versions
            .into_iter()
            .map(|version| DeleteResult {
                version,
                total: 1,
                deleted: usize::from(removed),
                delete_failed: usize::from(!removed),
                resources_present: !removed,
            })
            .collect())
    }

    async fn present_versions(&self, _: &AnyApplication) -> Result<Vec<String>, SyncError> {
        Ok(self.state().versions.clone())
    }

    async fn aggregated_health(&self, _: &AnyApplication) -> Result<HealthStatus, SyncError> {
        Ok(Self::health(&self.state()))
    }

    async fn load_local_application(
        &self,
        _: &AnyApplication,
    ) -> Result<Option<LocalApplication>, SyncError> {
        let state = self.state();
        let Some(version) = state.versions.first().cloned() else {
            return Ok(None);
        };
        let key = ResourceKey::new("apps", "Deployment", "web", "nginx");
        let bundle = ApplicationBundle::new(
            vec![key.clone()],
            BTreeMap::from([(key, Self::health(&state))]),
        );
        Ok(Some(LocalApplication {
            version: Some(version),
            bundle,
        }))
    }
}

/// Reconciler of one zone over an in-memory store and a scripted zone
#[derive(Debug)]
pub struct Harness {
    pub zone: String,
    pub store: Arc<InMemoryApplicationStore>,
    pub applications: Arc<FakeApplications>,
    pub events: Arc<RecordingEvents>,
    pub clock: FakeClock,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    /// Harness of zone [`ZONE`] with a store of its own
    pub fn new(applications: FakeApplications) -> Self {
        Self::in_zone(ZONE, Arc::new(InMemoryApplicationStore::new()), applications)
    }

    /// Harness of `zone` over `store`, which other harnesses may share
    pub fn in_zone(
        zone: &str,
        store: Arc<InMemoryApplicationStore>,
        applications: FakeApplications,
    ) -> Self {
        let config = ControllerConfig {
            runtime: RuntimeConfig::for_zone(zone),
            ..ControllerConfig::default()
        };
        let applications = Arc::new(applications);
        let events = Arc::new(RecordingEvents::new());
        let clock = FakeClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let reconciler = Arc::new(Reconciler::new(
            config.into_shared(),
            Arc::clone(&store) as Arc<dyn ApplicationStore>,
            Arc::clone(&applications) as Arc<dyn Applications>,
            Arc::clone(&events) as Arc<dyn EventSink>,
            Arc::new(clock.clone()),
        ));
        Self {
            zone: zone.to_string(),
            store,
            applications,
            events,
            clock,
            reconciler,
        }
    }

    pub fn insert(&self, application: AnyApplication) -> ApplicationId {
        self.store.insert(application).application_id()
    }

    pub async fn reconcile(&self, id: &ApplicationId) -> Action {
        let application = self.store.snapshot(id).expect("application exists");
        reconcile(Arc::new(application), Arc::clone(&self.reconciler))
            .await
            .expect("reconcile succeeds")
    }

    pub fn status(&self, id: &ApplicationId) -> AnyApplicationStatus {
        self.store
            .snapshot(id)
            .expect("application exists")
            .status_or_default()
    }

    pub fn condition(&self, id: &ApplicationId, condition_type: ConditionType) -> Option<Condition> {
        self.status(id)
            .find_condition(condition_type, &self.zone)
            .cloned()
    }

    /// Let spawned jobs run until `done` holds
    pub async fn wait_until(&self, mut done: impl FnMut(&Self) -> bool) {
        for _ in 0..1000 {
            if done(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached");
    }

    /// Let spawned jobs run until none is left
    pub async fn wait_for_jobs(&self) {
        self.wait_until(|h| h.reconciler.jobs().is_empty()).await;
    }
}

pub fn application(strategy: PlacementStrategy, status: AnyApplicationStatus) -> AnyApplication {
    let mut application = AnyApplication::new(
        "nginx",
        AnyApplicationSpec {
            application: ApplicationMatcherSpec {
                resource_selector: None,
                helm: Some(HelmSelectorSpec {
                    repository: "https://charts.example.com".to_string(),
                    chart: "nginx".to_string(),
                    version: "1.0.0".to_string(),
                    namespace: "web".to_string(),
                    values: None,
                }),
            },
            zones: 1,
            placement_strategy: PlacementStrategySpec { strategy },
            recover_strategy: RecoverStrategySpec {
                tolerance: 0,
                max_retries: 3,
            },
            sync_policy: None,
        },
    );
    application.metadata.namespace = Some("default".to_string());
    application.status = Some(status);
    application
}

pub fn condition(condition_type: ConditionType, status: &str) -> Condition {
    Condition::new(condition_type, ZONE, status, FIXTURE_TIME)
}
