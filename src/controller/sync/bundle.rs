//! # Application Bundle
//!
//! Expected resources (rendered from the application source) matched against
//! the resources observed in the zone.

use super::health::{worst, HealthStatus};
use super::ResourceKey;
use crate::crd::HealthStatusCode;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationBundle {
    expected: Vec<ResourceKey>,
    available: BTreeMap<ResourceKey, HealthStatus>,
}

impl ApplicationBundle {
    pub fn new(expected: Vec<ResourceKey>, available: BTreeMap<ResourceKey, HealthStatus>) -> Self {
        Self { expected, available }
    }

    pub fn expected(&self) -> &[ResourceKey] {
        &self.expected
    }

    pub fn available(&self) -> &BTreeMap<ResourceKey, HealthStatus> {
        &self.available
    }

    /// Every expected resource is present
    pub fn is_deployed(&self) -> bool {
        self.expected.iter().all(|key| self.available.contains_key(key))
    }

    /// Some resource of the application is present
    pub fn is_present(&self) -> bool {
        !self.available.is_empty()
    }

    /// Aggregated health of the bundle
    ///
    /// The first missing expected resource wins; otherwise the worst health
    /// of the available resources. An empty bundle is `Unknown`.
    pub fn determine_state(&self) -> HealthStatus {
        if let Some(missing) = self
            .expected
            .iter()
            .find(|key| !self.available.contains_key(key))
        {
            return HealthStatus::new(
                HealthStatusCode::Missing,
                format!("Resource is missing: {missing}"),
            );
        }
        worst(self.available.values().cloned())
            .unwrap_or_else(|| HealthStatus::unknown("No resources found"))
    }
}
