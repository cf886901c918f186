//! # Helm Rendering
//!
//! Renders a chart with `helm template` and parses the resulting multi-document YAML.

use super::SyncError;
use crate::crd::HelmSelectorSpec;
use async_trait::async_trait;
use kube::core::DynamicObject;
use serde::Deserialize;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

/// Turns an application's chart reference into concrete manifests
#[async_trait]
pub trait ChartRenderer: Send + Sync + Debug {
    async fn render(
        &self,
        helm: &HelmSelectorSpec,
        release_name: &str,
    ) -> Result<Vec<DynamicObject>, SyncError>;
}

/// Runs the `helm` binary
#[derive(Debug, Clone)]
pub struct HelmTemplateRenderer {
    binary: PathBuf,
}

impl Default for HelmTemplateRenderer {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("helm"),
        }
    }
}

impl HelmTemplateRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ChartRenderer for HelmTemplateRenderer {
    async fn render(
        &self,
        helm: &HelmSelectorSpec,
        release_name: &str,
    ) -> Result<Vec<DynamicObject>, SyncError> {
        debug!(
            chart = %helm.chart,
            version = %helm.version,
            repository = %helm.repository,
            "Running helm template"
        );
        let command = format!("{} template", self.binary.display());
        let command_error = |source| SyncError::Command {
            command: command.clone(),
            source,
        };

        let mut child = Command::new(&self.binary)
            .arg("template")
            .arg(release_name)
            .arg(&helm.chart)
            .args(["--repo", &helm.repository])
            .args(["--version", &helm.version])
            .args(["--namespace", &helm.namespace])
            .args(["--values", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(command_error)?;

        // values go through stdin so they never touch the filesystem
        if let Some(mut stdin) = child.stdin.take() {
            let values = helm.values.clone().unwrap_or_default();
            stdin
                .write_all(values.as_bytes())
                .await
                .map_err(command_error)?;
        }

        let output = child.wait_with_output().await.map_err(command_error)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("helm template failed for {} {}: {}", helm.chart, helm.version, stderr);
            return Err(SyncError::Render {
                chart: helm.chart.clone(),
                version: helm.version.clone(),
                message: stderr.trim().to_string(),
            });
        }

        let manifests = String::from_utf8(output.stdout).map_err(|e| SyncError::Render {
            chart: helm.chart.clone(),
            version: helm.version.clone(),
            message: format!("output is not UTF-8: {e}"),
        })?;
        parse_manifests(&manifests)
    }
}

/// Parse multi-document YAML into objects
///
/// Empty documents are skipped and `List` objects are flattened.
pub fn parse_manifests(yaml: &str) -> Result<Vec<DynamicObject>, SyncError> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| SyncError::Manifest(e.to_string()))?;
        if value.is_null() {
            continue;
        }
        let json = serde_json::to_value(value).map_err(|e| SyncError::Manifest(e.to_string()))?;

        if json.get("kind").and_then(|k| k.as_str()) == Some("List") {
            let items = json
                .get("items")
                .and_then(|items| items.as_array())
                .cloned()
                .unwrap_or_default();
            for item in items {
                objects.push(to_object(item)?);
            }
        } else {
            objects.push(to_object(json)?);
        }
    }
    Ok(objects)
}

fn to_object(value: serde_json::Value) -> Result<DynamicObject, SyncError> {
    let object: DynamicObject =
        serde_json::from_value(value).map_err(|e| SyncError::Manifest(e.to_string()))?;
    if object.types.is_none() {
        return Err(SyncError::Manifest(format!(
            "object {} has no apiVersion/kind",
            object.metadata.name.as_deref().unwrap_or("<unnamed>")
        )));
    }
    if object.metadata.name.is_none() {
        return Err(SyncError::Manifest("object has no metadata.name".to_string()));
    }
    Ok(object)
}
