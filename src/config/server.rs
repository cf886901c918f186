//! # Server Configuration
//!
//! HTTP server settings for metrics and health probes.

use serde::Deserialize;

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// HTTP server port for metrics and health probes
    pub metrics_port: u16,
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Server startup timeout (seconds)
    /// How long to wait for server to be ready before giving up
    pub startup_timeout_secs: u64,
    /// Server readiness poll interval (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

/// `server` section of the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ServerSection {
    pub metrics_port: Option<u16>,
    pub bind_address: Option<String>,
    pub startup_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

impl ServerConfig {
    pub(crate) fn apply_file(&mut self, section: ServerSection) {
        if let Some(port) = section.metrics_port {
            self.metrics_port = port;
        }
        if let Some(address) = section.bind_address {
            self.bind_address = address;
        }
        if let Some(timeout) = section.startup_timeout_secs {
            self.startup_timeout_secs = timeout;
        }
        if let Some(interval) = section.poll_interval_ms {
            self.poll_interval_ms = interval;
        }
    }

    pub(crate) fn apply_env<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.metrics_port = super::env_var_or_default(lookup, "METRICS_PORT", self.metrics_port);
        if let Some(address) = lookup("BIND_ADDRESS") {
            self.bind_address = address;
        }
        self.startup_timeout_secs = super::env_var_or_default(
            lookup,
            "SERVER_STARTUP_TIMEOUT_SECS",
            self.startup_timeout_secs,
        );
        self.poll_interval_ms =
            super::env_var_or_default(lookup, "SERVER_POLL_INTERVAL_MS", self.poll_interval_ms);
    }

    /// `address:port` the server listens on
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.metrics_port)
    }
}
