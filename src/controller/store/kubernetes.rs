//! Kubernetes-backed application store.

use super::{ApplicationStore, StoreError};
use crate::constants::FIELD_MANAGER;
use crate::crd::{AnyApplication, ApplicationId};
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::debug;

#[derive(Clone)]
pub struct KubeApplicationStore {
    client: Client,
}

impl std::fmt::Debug for KubeApplicationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApplicationStore").finish_non_exhaustive()
    }
}

impl KubeApplicationStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<AnyApplication> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_api_error(id: &ApplicationId, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound(id.clone()),
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict(id.clone()),
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ApplicationStore for KubeApplicationStore {
    async fn get(&self, id: &ApplicationId) -> Result<Option<AnyApplication>, StoreError> {
        self.api(&id.namespace)
            .get_opt(&id.name)
            .await
            .map_err(|e| map_api_error(id, e))
    }

    async fn update_status(&self, application: &AnyApplication) -> Result<AnyApplication, StoreError> {
        let id = application.application_id();
        let status = application.status_or_default();

        // Lists are always sent so that emptied placements or zones are cleared by the merge
        let mut status_value = serde_json::to_value(&status)?;
        status_value["placements"] = serde_json::to_value(&status.placements)?;
        status_value["zones"] = serde_json::to_value(&status.zones)?;

        // resourceVersion in the patch turns the merge into a conditional write (409 on mismatch)
        let patch = json!({
            "metadata": { "resourceVersion": application.metadata.resource_version },
            "status": status_value,
        });

        let updated = self
            .api(&id.namespace)
            .patch_status(&id.name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| map_api_error(&id, e))?;
        debug!(
            application = %id,
            resource_version = updated.metadata.resource_version.as_deref().unwrap_or_default(),
            "Status written"
        );
        Ok(updated)
    }

    async fn patch_finalizers(
        &self,
        id: &ApplicationId,
        finalizers: Vec<String>,
    ) -> Result<(), StoreError> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.api(&id.namespace)
            .patch(&id.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| map_api_error(id, e))?;
        Ok(())
    }
}
