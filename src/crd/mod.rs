//! # Custom Resource Definitions
//!
//! CRD types for the AnyApplication Controller.
//!
//! An `AnyApplication` describes a workload that must be placed on, deployed to,
//! monitored in and eventually removed from a set of independently operated zones.
//! Zones never talk to each other directly; they coordinate through the
//! versioned status record defined in [`status`].

pub mod conditions;
pub mod status;

pub use status::*;

use crate::constants::DEFAULT_MAX_RETRIES;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// AnyApplication Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: dcp.hiro.io/v1
/// kind: AnyApplication
/// metadata:
///   name: nginx-app
///   namespace: default
/// spec:
///   application:
///     helm:
///       repository: https://helm.nginx.com/stable
///       chart: nginx-ingress
///       version: 2.0.1
///       namespace: nginx
///   zones: 1
///   placement-strategy:
///     strategy: Local
///   recover-strategy:
///     tolerance: 1
///     max-retries: 3
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[kube(
    kind = "AnyApplication",
    group = "dcp.hiro.io",
    version = "v1",
    namespaced,
    status = "AnyApplicationStatus",
    shortname = "anyapp",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Owner", "type":"string", "jsonPath":".status.owner"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct AnyApplicationSpec {
    /// Source of the application resources
    pub application: ApplicationMatcherSpec,
    /// Number of zones the application should run in
    pub zones: i32,
    /// How placement decisions are made
    #[serde(default, rename = "placement-strategy")]
    pub placement_strategy: PlacementStrategySpec,
    /// Failure tolerance and retry budget
    #[serde(default, rename = "recover-strategy")]
    pub recover_strategy: RecoverStrategySpec,
    /// Sync options, e.g. `syncTimeout=10m`
    #[serde(default, rename = "sync-policy", skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<SyncPolicySpec>,
}

/// Where the application resources come from
///
/// Exactly one of `helm` or `resourceSelector` is expected.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
pub struct ApplicationMatcherSpec {
    /// Label selector over resources that already exist in the zone
    #[serde(default, rename = "resourceSelector", skip_serializing_if = "Option::is_none")]
    pub resource_selector: Option<BTreeMap<String, String>>,
    /// Helm chart rendered and applied by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmSelectorSpec>,
}

/// Helm chart reference
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
pub struct HelmSelectorSpec {
    pub repository: String,
    pub chart: String,
    pub version: String,
    /// Namespace the chart is installed into
    pub namespace: String,
    /// Inline values file (YAML)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
pub struct PlacementStrategySpec {
    pub strategy: PlacementStrategy,
}

/// Placement strategy
///
/// `Local` lets the owner zone place the application on itself;
/// `Global` waits for an external scheduler to fill in `status.placements`.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq, Eq)]
pub enum PlacementStrategy {
    #[default]
    Local,
    Global,
}

/// Failure tolerance and retry budget
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
pub struct RecoverStrategySpec {
    /// Number of failing zones tolerated before the application is in `Failure`
    #[serde(default)]
    pub tolerance: i32,
    /// Attempts made by deploy and undeploy jobs (defaults to 3)
    #[serde(default, rename = "max-retries")]
    pub max_retries: i32,
}

impl RecoverStrategySpec {
    /// Attempt budget for deploy and undeploy jobs
    pub fn max_attempts(&self) -> u32 {
        u32::try_from(self.max_retries)
            .ok()
            .filter(|attempts| *attempts > 0)
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicySpec {
    /// `key=value` options; `syncTimeout=<duration>` overrides the deploy timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_options: Option<Vec<String>>,
}

/// Namespaced identity of an application
///
/// Used as the key of the job registry and of the application store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplicationId {
    pub namespace: String,
    pub name: String,
}

impl ApplicationId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl AnyApplication {
    /// Namespaced identity of this application
    pub fn application_id(&self) -> ApplicationId {
        ApplicationId::new(
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    /// Instance id stamped on every resource deployed for this application
    pub fn instance_id(&self) -> String {
        let id = self.application_id();
        format!("{}-{}", id.namespace, id.name)
    }

    /// Version that should be running, if the source pins one
    pub fn target_version(&self) -> Option<&str> {
        self.spec
            .application
            .helm
            .as_ref()
            .map(|helm| helm.version.as_str())
    }

    /// Deploy timeout: `syncTimeout` sync option or the given default
    pub fn sync_timeout(&self, default_timeout: Duration) -> Duration {
        self.spec
            .sync_policy
            .as_ref()
            .and_then(|policy| policy.sync_options.as_deref())
            .and_then(|options| sync_option(options, "syncTimeout"))
            .and_then(|value| crate::config::parse_duration(&value).ok())
            .unwrap_or(default_timeout)
    }

    /// Current status or an empty one
    pub fn status_or_default(&self) -> AnyApplicationStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|finalizers| finalizers.iter().any(|f| f == finalizer))
    }
}

/// Look up `key` in a list of `key=value` options
///
/// Entries without `=` are treated as keys with an empty value.
pub fn sync_option(options: &[String], key: &str) -> Option<String> {
    options.iter().find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
        (k == key).then(|| v.to_string())
    })
}
