//! # Runtime Configuration
//!
//! Settings consumed by the state machines and jobs of a single zone.

use super::{parse_duration, ConfigError};
use crate::crd::{Condition, ConditionType, DeploymentStatus, HealthStatusCode, UndeploymentStatus};
use serde::Deserialize;
use std::time::Duration;

/// Zone-local settings handed to state machines and jobs
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Identifier of the zone this controller instance runs in
    pub zone_id: String,
    /// Interval between health polls of a running application
    pub poll_operational_status_interval: Duration,
    /// Interval between sync attempts of deploy and undeploy jobs
    pub poll_sync_status_interval: Duration,
    /// Deploy deadline when the application has no `syncTimeout` option
    pub default_sync_timeout: Duration,
    /// Undeploy deadline per attempt
    pub default_undeploy_timeout: Duration,
    /// Condition values that count a zone as failing
    pub failing_conditions: FailingConditions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            zone_id: DEFAULT_ZONE_ID.to_string(),
            poll_operational_status_interval: Duration::from_secs(
                DEFAULT_POLL_OPERATIONAL_STATUS_INTERVAL_SECS,
            ),
            poll_sync_status_interval: Duration::from_secs(DEFAULT_POLL_SYNC_STATUS_INTERVAL_SECS),
            default_sync_timeout: Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS),
            default_undeploy_timeout: Duration::from_secs(DEFAULT_UNDEPLOY_TIMEOUT_SECS),
            failing_conditions: FailingConditions::default(),
        }
    }
}

impl RuntimeConfig {
    /// Default settings for the given zone
    pub fn for_zone(zone_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            ..Self::default()
        }
    }

    pub(crate) fn apply_file(&mut self, section: RuntimeSection) -> Result<(), ConfigError> {
        if let Some(zone_id) = section.zone_id {
            self.zone_id = zone_id;
        }
        apply_duration(&mut self.poll_operational_status_interval, section.poll_operational_status_interval)?;
        apply_duration(&mut self.poll_sync_status_interval, section.poll_sync_status_interval)?;
        apply_duration(&mut self.default_sync_timeout, section.default_sync_timeout)?;
        apply_duration(&mut self.default_undeploy_timeout, section.default_undeploy_timeout)?;
        if let Some(failing) = section.failing_conditions {
            self.failing_conditions = failing;
        }
        Ok(())
    }

    pub(crate) fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(zone_id) = lookup("ZONE_ID") {
            self.zone_id = zone_id;
        }
        apply_duration(
            &mut self.poll_operational_status_interval,
            lookup("POLL_OPERATIONAL_STATUS_INTERVAL"),
        )?;
        apply_duration(&mut self.poll_sync_status_interval, lookup("POLL_SYNC_STATUS_INTERVAL"))?;
        apply_duration(&mut self.default_sync_timeout, lookup("DEFAULT_SYNC_TIMEOUT"))?;
        apply_duration(&mut self.default_undeploy_timeout, lookup("DEFAULT_UNDEPLOY_TIMEOUT"))?;
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.zone_id.trim().is_empty() {
            return Err(ConfigError::Invalid("zone id cannot be empty".to_string()));
        }
        let intervals = [
            ("pollOperationalStatusInterval", self.poll_operational_status_interval),
            ("pollSyncStatusInterval", self.poll_sync_status_interval),
            ("defaultSyncTimeout", self.default_sync_timeout),
            ("defaultUndeployTimeout", self.default_undeploy_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }
        Ok(())
    }
}

fn apply_duration(target: &mut Duration, value: Option<String>) -> Result<(), ConfigError> {
    if let Some(value) = value {
        *target = parse_duration(&value)?;
    }
    Ok(())
}

/// Explicit set of condition values that mark a zone as failing
///
/// Only `Local`, `Deployment` and `Undeployment` conditions are considered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FailingConditions {
    pub local: Vec<HealthStatusCode>,
    pub deployment: Vec<DeploymentStatus>,
    pub undeployment: Vec<UndeploymentStatus>,
}

impl Default for FailingConditions {
    fn default() -> Self {
        Self {
            local: vec![HealthStatusCode::Degraded, HealthStatusCode::Missing],
            deployment: vec![DeploymentStatus::Failure],
            undeployment: vec![UndeploymentStatus::Failure],
        }
    }
}

impl FailingConditions {
    pub fn is_failing(&self, condition: &Condition) -> bool {
        let status = condition.status.as_str();
        match condition.r#type {
            ConditionType::Local => self.local.iter().any(|s| s.as_str() == status),
            ConditionType::Deployment => self.deployment.iter().any(|s| s.as_str() == status),
            ConditionType::Undeployment => self.undeployment.iter().any(|s| s.as_str() == status),
            _ => false,
        }
    }
}

/// `runtime` section of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RuntimeSection {
    pub zone_id: Option<String>,
    pub poll_operational_status_interval: Option<String>,
    pub poll_sync_status_interval: Option<String>,
    pub default_sync_timeout: Option<String>,
    pub default_undeploy_timeout: Option<String>,
    pub failing_conditions: Option<FailingConditions>,
}
