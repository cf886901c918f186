//! # OpenTelemetry Support
//!
//! Installs an OpenTelemetry tracer provider when `OTEL_SERVICE_NAME` is set.
//! Without it the global no-op provider stays in place and the reconcile
//! spans recorded through [`opentelemetry::global`] cost nothing.

use anyhow::Result;
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing::{info, warn};

/// Tracer name used for spans recorded by this crate
pub const TRACER_NAME: &str = "anyapplication-controller";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtelConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: Option<String>,
}

impl OtelConfig {
    /// Read the configuration from environment variables
    ///
    /// Returns `None` when `OTEL_SERVICE_NAME` is not set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let service_name = lookup("OTEL_SERVICE_NAME").filter(|name| !name.is_empty())?;
        Some(Self {
            service_name,
            service_version: lookup("OTEL_SERVICE_VERSION")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            environment: lookup("DEPLOYMENT_ENVIRONMENT"),
        })
    }

    fn resource(&self) -> Resource {
        let mut builder = Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attribute(KeyValue::new("service.version", self.service_version.clone()));
        if let Some(environment) = &self.environment {
            builder = builder.with_attribute(KeyValue::new(
                "deployment.environment",
                environment.clone(),
            ));
        }
        builder.build()
    }
}

/// Initialize OpenTelemetry tracing
///
/// Returns `Ok(None)` when OpenTelemetry is not configured.
/// The returned provider must be passed to [`shutdown_otel`] on exit.
#[allow(clippy::missing_errors_doc)]
pub fn init_otel(config: Option<&OtelConfig>) -> Result<Option<SdkTracerProvider>> {
    let Some(config) = config else {
        return Ok(None);
    };
    let provider = SdkTracerProvider::builder()
        .with_resource(config.resource())
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());
    info!(
        "OpenTelemetry tracer provider installed: service={}, version={}, env={:?}",
        config.service_name, config.service_version, config.environment
    );
    Ok(Some(provider))
}

/// Flush and shut down the tracer provider
pub fn shutdown_otel(provider: Option<SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            warn!("Failed to shut down OpenTelemetry tracer provider: {}", e);
        }
    }
}
