//! # Cluster Applications
//!
//! [`Applications`] against the local cluster.
//!
//! - Rendered objects are labelled with the application instance and version,
//!   then applied with server-side apply.
//! - Present versions are found by listing instance-labelled objects of every
//!   kind this controller has rendered for the application.
//! - Health uses simple built-in rules for workload kinds; everything else is Healthy.

use super::{
    Applications, ApplicationBundle, ChartRenderer, DeleteResult, HealthStatus, LocalApplication,
    ResourceKey, ResourceResult, SyncError, SyncResult,
};
use crate::constants::{FIELD_MANAGER, INSTANCE_LABEL, VERSION_LABEL};
use crate::crd::{AnyApplication, HealthStatusCode};
use async_trait::async_trait;
use dashmap::DashMap;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::discovery::{pinned_kind, Scope};
use kube::Client;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

type KindKey = (String, String, String);

pub struct ClusterApplications {
    client: Client,
    renderer: Arc<dyn ChartRenderer>,
    /// Rendered manifests by (instance id, version)
    rendered: DashMap<(String, String), Vec<DynamicObject>>,
    /// Kinds ever rendered per instance id
    kinds: DashMap<String, BTreeSet<KindKey>>,
    /// Discovery results by (group, version, kind)
    resources: DashMap<KindKey, (ApiResource, bool)>,
}

impl fmt::Debug for ClusterApplications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterApplications")
            .field("renderer", &self.renderer)
            .field("rendered", &self.rendered.len())
            .finish_non_exhaustive()
    }
}

impl ClusterApplications {
    pub fn new(client: Client, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self {
            client,
            renderer,
            rendered: DashMap::new(),
            kinds: DashMap::new(),
            resources: DashMap::new(),
        }
    }

    /// Render the target version, labelled and namespaced, cached per version
    async fn render_target(&self, application: &AnyApplication) -> Result<Vec<DynamicObject>, SyncError> {
        let helm = application
            .spec
            .application
            .helm
            .as_ref()
            .ok_or_else(|| SyncError::NoSource(application.application_id()))?;
        let instance_id = application.instance_id();
        let cache_key = (instance_id.clone(), helm.version.clone());
        if let Some(objects) = self.rendered.get(&cache_key) {
            return Ok(objects.clone());
        }

        let mut objects = self.renderer.render(helm, &instance_id).await?;
        for object in &mut objects {
            let labels = object.metadata.labels.get_or_insert_with(BTreeMap::new);
            labels.insert(INSTANCE_LABEL.to_string(), instance_id.clone());
            labels.insert(VERSION_LABEL.to_string(), helm.version.clone());
        }

        let mut kinds = self.kinds.entry(instance_id).or_default();
        for object in &objects {
            if let Some(kind) = kind_key(object) {
                kinds.insert(kind);
            }
        }
        drop(kinds);

        self.rendered.insert(cache_key, objects.clone());
        Ok(objects)
    }

    async fn api_resource(&self, kind: &KindKey) -> Result<(ApiResource, bool), SyncError> {
        if let Some(found) = self.resources.get(kind) {
            return Ok(found.clone());
        }
        let gvk = GroupVersionKind::gvk(&kind.0, &kind.1, &kind.2);
        let (resource, capabilities) = pinned_kind(&self.client, &gvk)
            .await
            .map_err(|_| SyncError::UnknownKind(format!("{}/{}/{}", kind.0, kind.1, kind.2)))?;
        let namespaced = matches!(capabilities.scope, Scope::Namespaced);
        self.resources
            .insert(kind.clone(), (resource.clone(), namespaced));
        Ok((resource, namespaced))
    }

    fn api(&self, resource: &ApiResource, namespaced: bool, namespace: &str) -> Api<DynamicObject> {
        if namespaced {
            Api::namespaced_with(self.client.clone(), namespace, resource)
        } else {
            Api::all_with(self.client.clone(), resource)
        }
    }

    async fn apply(&self, object: &DynamicObject, namespace: &str) -> Result<ResourceKey, SyncError> {
        let kind = kind_key(object)
            .ok_or_else(|| SyncError::Manifest("object has no apiVersion/kind".to_string()))?;
        let (resource, namespaced) = self.api_resource(&kind).await?;
        let object_namespace = object.metadata.namespace.as_deref().unwrap_or(namespace);
        let name = object.metadata.name.clone().unwrap_or_default();

        let mut object = object.clone();
        if namespaced {
            object.metadata.namespace = Some(object_namespace.to_string());
        }
        self.api(&resource, namespaced, object_namespace)
            .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&object))
            .await?;
        Ok(resource_key(&kind, namespaced.then_some(object_namespace), &name))
    }

    /// Expected keys of the rendered objects
    async fn expected_keys(
        &self,
        objects: &[DynamicObject],
        namespace: &str,
    ) -> Result<Vec<ResourceKey>, SyncError> {
        let mut keys = Vec::with_capacity(objects.len());
        for object in objects {
            let Some(kind) = kind_key(object) else { continue };
            let (_, namespaced) = self.api_resource(&kind).await?;
            let object_namespace = object.metadata.namespace.as_deref().unwrap_or(namespace);
            keys.push(resource_key(
                &kind,
                namespaced.then_some(object_namespace),
                object.metadata.name.as_deref().unwrap_or_default(),
            ));
        }
        Ok(keys)
    }

    /// Instance-labelled objects in the zone, with their kind
    async fn list_labelled(
        &self,
        application: &AnyApplication,
        version: Option<&str>,
    ) -> Result<Vec<(KindKey, bool, DynamicObject)>, SyncError> {
        let instance_id = application.instance_id();
        let mut selector = format!("{INSTANCE_LABEL}={instance_id}");
        if let Some(version) = version {
            selector.push_str(&format!(",{VERSION_LABEL}={version}"));
        }
        let kinds: Vec<KindKey> = self
            .kinds
            .get(&instance_id)
            .map(|kinds| kinds.iter().cloned().collect())
            .unwrap_or_default();

        let mut found = Vec::new();
        for kind in kinds {
            let (resource, namespaced) = self.api_resource(&kind).await?;
            let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
            let list = api.list(&ListParams::default().labels(&selector)).await?;
            for object in list.items {
                found.push((kind.clone(), namespaced, object));
            }
        }
        Ok(found)
    }

    async fn observe(
        &self,
        application: &AnyApplication,
        expected: Vec<ResourceKey>,
    ) -> Result<ApplicationBundle, SyncError> {
        let mut available = BTreeMap::new();
        for (kind, namespaced, object) in self.list_labelled(application, None).await? {
            let key = resource_key(
                &kind,
                object.metadata.namespace.as_deref().filter(|_| namespaced),
                object.metadata.name.as_deref().unwrap_or_default(),
            );
            available.insert(key, resource_health(&kind.2, &object.data));
        }
        Ok(ApplicationBundle::new(expected, available))
    }

    fn namespace_of(application: &AnyApplication) -> String {
        application
            .spec
            .application
            .helm
            .as_ref()
            .map(|helm| helm.namespace.clone())
            .filter(|ns| !ns.is_empty())
            .or_else(|| application.metadata.namespace.clone())
            .unwrap_or_else(|| "default".to_string())
    }
}

#[async_trait]
impl Applications for ClusterApplications {
    async fn sync_version(&self, application: &AnyApplication) -> Result<SyncResult, SyncError> {
        let namespace = Self::namespace_of(application);
        let version = application.target_version().unwrap_or_default().to_string();
        let objects = self.render_target(application).await?;

        let mut resources = Vec::with_capacity(objects.len());
        for object in &objects {
            let name = object.metadata.name.clone().unwrap_or_default();
            match self.apply(object, &namespace).await {
                Ok(key) => resources.push(ResourceResult {
                    key,
                    synced: true,
                    message: String::new(),
                }),
                Err(e) => {
                    warn!(application = %application.application_id(), "Failed to apply {}: {}", name, e);
                    let kind = kind_key(object).unwrap_or_default();
                    resources.push(ResourceResult {
                        key: resource_key(&kind, Some(&namespace), &name),
                        synced: false,
                        message: e.to_string(),
                    });
                }
            }
        }

        let expected = self.expected_keys(&objects, &namespace).await?;
        let bundle = self.observe(application, expected).await?;
        Ok(SyncResult {
            version,
            deployed: bundle.is_deployed(),
            health: bundle.determine_state(),
            resources,
        })
    }

    async fn cleanup(&self, application: &AnyApplication) -> Result<Vec<DeleteResult>, SyncError> {
        let mut results = Vec::new();
        for version in self.present_versions(application).await? {
            let objects = self.list_labelled(application, Some(&version)).await?;
            let mut result = DeleteResult {
                version: version.clone(),
                total: objects.len(),
                deleted: 0,
                delete_failed: 0,
                resources_present: false,
            };
            for (kind, namespaced, object) in objects {
                let (resource, _) = self.api_resource(&kind).await?;
                let namespace = object.metadata.namespace.clone().unwrap_or_default();
                let name = object.metadata.name.clone().unwrap_or_default();
                match self
                    .api(&resource, namespaced, &namespace)
                    .delete(&name, &DeleteParams::background())
                    .await
                {
                    Ok(_) => result.deleted += 1,
                    Err(kube::Error::Api(api_err)) if api_err.code == 404 => result.deleted += 1,
                    Err(e) => {
                        warn!(application = %application.application_id(), "Failed to delete {}: {}", name, e);
                        result.delete_failed += 1;
                    }
                }
            }
            result.resources_present = !self
                .list_labelled(application, Some(&version))
                .await?
                .is_empty();
            info!(
                application = %application.application_id(),
                "Deleted version {}: {}/{} resources",
                version,
                result.deleted,
                result.total
            );
            results.push(result);
        }
        Ok(results)
    }

    async fn present_versions(&self, application: &AnyApplication) -> Result<Vec<String>, SyncError> {
        // make sure the target version's kinds are known before listing
        if application.spec.application.helm.is_some() {
            if let Err(e) = self.render_target(application).await {
                debug!(application = %application.application_id(), "Render failed while listing versions: {}", e);
            }
        }
        let versions: BTreeSet<String> = self
            .list_labelled(application, None)
            .await?
            .into_iter()
            .filter_map(|(_, _, object)| {
                object
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(VERSION_LABEL).cloned())
            })
            .collect();
        Ok(versions.into_iter().collect())
    }

    async fn aggregated_health(&self, application: &AnyApplication) -> Result<HealthStatus, SyncError> {
        let namespace = Self::namespace_of(application);
        let objects = self.render_target(application).await?;
        let expected = self.expected_keys(&objects, &namespace).await?;
        Ok(self.observe(application, expected).await?.determine_state())
    }

    async fn load_local_application(
        &self,
        application: &AnyApplication,
    ) -> Result<Option<LocalApplication>, SyncError> {
        let namespace = Self::namespace_of(application);
        let objects = self.render_target(application).await?;
        let expected = self.expected_keys(&objects, &namespace).await?;
        let bundle = self.observe(application, expected).await?;
        if !bundle.is_present() {
            return Ok(None);
        }
        Ok(Some(LocalApplication {
            version: application.target_version().map(str::to_string),
            bundle,
        }))
    }
}

fn kind_key(object: &DynamicObject) -> Option<KindKey> {
    let types = object.types.as_ref()?;
    let (group, version) = types
        .api_version
        .split_once('/')
        .map_or((String::new(), types.api_version.clone()), |(g, v)| {
            (g.to_string(), v.to_string())
        });
    Some((group, version, types.kind.clone()))
}

fn resource_key(kind: &KindKey, namespace: Option<&str>, name: &str) -> ResourceKey {
    ResourceKey::new(&kind.0, &kind.2, namespace.unwrap_or_default(), name)
}

fn int_at(data: &Value, pointer: &str) -> Option<i64> {
    data.pointer(pointer).and_then(Value::as_i64)
}

fn has_condition(data: &Value, condition_type: &str, status: &str, reason: Option<&str>) -> bool {
    data.pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some(condition_type)
                    && c.get("status").and_then(Value::as_str) == Some(status)
                    && reason.is_none_or(|r| c.get("reason").and_then(Value::as_str) == Some(r))
            })
        })
}

/// Health of a live object from its kind and body
pub(crate) fn resource_health(kind: &str, data: &Value) -> HealthStatus {
    match kind {
        "Deployment" => {
            if data.pointer("/spec/paused").and_then(Value::as_bool) == Some(true) {
                return HealthStatus::new(HealthStatusCode::Suspended, "Deployment is paused");
            }
            if has_condition(data, "Progressing", "False", Some("ProgressDeadlineExceeded")) {
                return HealthStatus::new(HealthStatusCode::Degraded, "Deployment exceeded its progress deadline");
            }
            let desired = int_at(data, "/spec/replicas").unwrap_or(1);
            let updated = int_at(data, "/status/updatedReplicas").unwrap_or(0);
            let available = int_at(data, "/status/availableReplicas").unwrap_or(0);
            if updated < desired || available < desired {
                HealthStatus::new(
                    HealthStatusCode::Progressing,
                    format!("Waiting for rollout: {available} of {desired} replicas available"),
                )
            } else {
                HealthStatus::healthy()
            }
        }
        "StatefulSet" => {
            let desired = int_at(data, "/spec/replicas").unwrap_or(1);
            let ready = int_at(data, "/status/readyReplicas").unwrap_or(0);
            if ready < desired {
                HealthStatus::new(
                    HealthStatusCode::Progressing,
                    format!("Waiting for rollout: {ready} of {desired} replicas ready"),
                )
            } else {
                HealthStatus::healthy()
            }
        }
        "DaemonSet" => {
            let desired = int_at(data, "/status/desiredNumberScheduled").unwrap_or(0);
            let available = int_at(data, "/status/numberAvailable").unwrap_or(0);
            if available < desired {
                HealthStatus::new(
                    HealthStatusCode::Progressing,
                    format!("Waiting for rollout: {available} of {desired} pods available"),
                )
            } else {
                HealthStatus::healthy()
            }
        }
        "Pod" => pod_health(data),
        "Job" => {
            if data.pointer("/spec/suspend").and_then(Value::as_bool) == Some(true) {
                return HealthStatus::new(HealthStatusCode::Suspended, "Job is suspended");
            }
            if has_condition(data, "Failed", "True", None) {
                return HealthStatus::new(HealthStatusCode::Degraded, "Job failed");
            }
            if int_at(data, "/status/succeeded").unwrap_or(0) > 0 {
                HealthStatus::healthy()
            } else {
                HealthStatus::new(HealthStatusCode::Progressing, "Job is running")
            }
        }
        _ => HealthStatus::healthy(),
    }
}

fn pod_health(data: &Value) -> HealthStatus {
    const FAILING_REASONS: [&str; 4] = [
        "CrashLoopBackOff",
        "ImagePullBackOff",
        "ErrImagePull",
        "CreateContainerConfigError",
    ];
    let statuses = data
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for status in &statuses {
        if let Some(reason) = status.pointer("/state/waiting/reason").and_then(Value::as_str) {
            if FAILING_REASONS.contains(&reason) {
                return HealthStatus::new(HealthStatusCode::Degraded, reason);
            }
        }
    }

    match data.pointer("/status/phase").and_then(Value::as_str) {
        Some("Succeeded") => HealthStatus::healthy(),
        Some("Failed") => HealthStatus::new(HealthStatusCode::Degraded, "Pod failed"),
        Some("Pending") => HealthStatus::new(HealthStatusCode::Progressing, "Pod is pending"),
        Some("Running") => {
            let all_ready = statuses
                .iter()
                .all(|s| s.get("ready").and_then(Value::as_bool) == Some(true));
            if all_ready {
                HealthStatus::healthy()
            } else {
                HealthStatus::new(HealthStatusCode::Progressing, "Containers are not ready")
            }
        }
        _ => HealthStatus::unknown("Pod phase is unknown"),
    }
}
