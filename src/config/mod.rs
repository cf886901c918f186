//! # Controller Configuration
//!
//! Configuration is assembled in two layers:
//!
//! 1. An optional YAML file (`--config`, default [`DEFAULT_CONFIG_PATH`]). A missing
//!    file is not an error, every key has a default.
//! 2. Environment variables, which override the file. Durations use the same
//!    syntax as the file (`5s`, `1m30s`, ...).
//!
//! ```yaml
//! runtime:
//!   zoneId: zone-a
//!   pollOperationalStatusInterval: 5s
//!   defaultSyncTimeout: 5m
//!   failingConditions:
//!     local: [Degraded, Missing]
//!     deployment: [Failure]
//!     undeployment: [Failure]
//! server:
//!   metricsPort: 8080
//! logging:
//!   defaultLevel: info
//!   components:
//!     kube_runtime: warn
//! statusUpdateRetries: 5
//! reconcileRequeueInterval: 1s
//! ```
//!
//! [`DEFAULT_CONFIG_PATH`]: crate::constants::DEFAULT_CONFIG_PATH

mod duration;
mod runtime;
mod server;

pub use duration::{format_duration, parse_duration};
pub use runtime::{FailingConditions, RuntimeConfig};
pub use server::ServerConfig;

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_RECONCILE_REQUEUE_SECS, DEFAULT_STATUS_UPDATE_RETRIES,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Global controller configuration
pub type SharedControllerConfig = Arc<RwLock<ControllerConfig>>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Log levels, applied when `RUST_LOG` is not set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub default_level: String,
    /// Per-target overrides, e.g. `kube_runtime: warn`
    pub components: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: DEFAULT_LOG_LEVEL.to_string(),
            components: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directives, e.g. `info,kube_runtime=warn`
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.default_level.clone())
            .chain(
                self.components
                    .iter()
                    .map(|(target, level)| format!("{target}={level}")),
            )
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub runtime: RuntimeConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Attempts of the optimistic-concurrency status update loop
    pub status_update_retries: u32,
    /// Requeue interval while a job is active for an application
    pub reconcile_requeue_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            status_update_retries: DEFAULT_STATUS_UPDATE_RETRIES,
            reconcile_requeue_interval: Duration::from_secs(DEFAULT_RECONCILE_REQUEUE_SECS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    runtime: runtime::RuntimeSection,
    #[serde(default)]
    server: server::ServerSection,
    #[serde(default)]
    logging: LoggingSection,
    status_update_retries: Option<u32>,
    reconcile_requeue_interval: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LoggingSection {
    default_level: Option<String>,
    #[serde(default)]
    components: BTreeMap<String, String>,
}

impl ControllerConfig {
    /// Load the file at `path` (if it exists), then apply process environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Same as [`ControllerConfig::load`] with an explicit environment lookup
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            config.apply_yaml(path, &content)?;
        }
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides only
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(&|key: &str| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_yaml(&mut self, path: &Path, content: &str) -> Result<(), ConfigError> {
        // an empty file deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(());
        }
        let file: ConfigFile = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        self.runtime.apply_file(file.runtime)?;
        self.server.apply_file(file.server);
        if let Some(level) = file.logging.default_level {
            self.logging.default_level = level;
        }
        self.logging.components.extend(file.logging.components);
        if let Some(retries) = file.status_update_retries {
            self.status_update_retries = retries;
        }
        if let Some(interval) = file.reconcile_requeue_interval {
            self.reconcile_requeue_interval = parse_duration(&interval)?;
        }
        Ok(())
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.runtime.apply_env(lookup)?;
        self.server.apply_env(lookup);
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.default_level = level;
        }
        self.status_update_retries =
            env_var_or_default(lookup, "STATUS_UPDATE_RETRIES", self.status_update_retries);
        if let Some(interval) = lookup("RECONCILE_REQUEUE_INTERVAL") {
            self.reconcile_requeue_interval = parse_duration(&interval)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runtime.validate()?;
        if self.status_update_retries == 0 {
            return Err(ConfigError::Invalid(
                "statusUpdateRetries must be greater than 0".to_string(),
            ));
        }
        if self.reconcile_requeue_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reconcileRequeueInterval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Wrap into the shared handle used by the reconciler
    pub fn into_shared(self) -> SharedControllerConfig {
        Arc::new(RwLock::new(self))
    }
}

/// Read a variable through `lookup` or return the default when missing or unparseable
fn env_var_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
