//! # Initialization
//!
//! Controller initialization: rustls setup, configuration, OpenTelemetry,
//! tracing, metrics, server startup, Kubernetes client and reconciler setup.

use crate::clock::SystemClock;
use crate::config::ControllerConfig;
use crate::constants;
use crate::controller::events::KubeEventSink;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::store::KubeApplicationStore;
use crate::controller::sync::{ClusterApplications, HelmTemplateRenderer};
use crate::crd::AnyApplication;
use crate::observability;
use crate::server::{start_server, ServerState};
use anyhow::{Context, Result};
use clap::Parser;
use kube::api::{Api, ListParams};
use kube::Client;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Command line of the controller binary
#[derive(Debug, Parser)]
#[command(name = "anyapplication-controller", version, about = "AnyApplication controller")]
pub struct ControllerArgs {
    /// Path of the YAML configuration file
    #[arg(long, default_value = constants::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub applications: Api<AnyApplication>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    /// OpenTelemetry tracer provider (if initialized)
    pub otel_tracer_provider: Option<SdkTracerProvider>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - configuration loading
/// - OpenTelemetry and tracing subscriber setup
/// - metrics registration and HTTP server startup
/// - Kubernetes client and reconciler setup
/// - reconciliation of existing resources
pub async fn initialize(args: ControllerArgs) -> Result<InitializationResult> {
    // Required for rustls 0.23+ before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    let config = ControllerConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let otel_config = observability::otel::OtelConfig::from_env();
    let otel_tracer_provider = observability::otel::init_otel(otel_config.as_ref())
        .context("Failed to initialize OpenTelemetry")?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.filter_directives().into());
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        warn!("Tracing subscriber already initialized: {}", e);
    }

    info!(
        "Starting AnyApplication controller v{} in zone '{}'",
        env!("CARGO_PKG_VERSION"),
        config.runtime.zone_id
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let address = config.server.listen_address();
    let server_state_clone = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(&address, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&config, &server_state, &server_handle).await?;

    let client = Client::try_default().await?;
    let applications: Api<AnyApplication> = Api::all(client.clone());

    let zone_id = config.runtime.zone_id.clone();
    let reconciler = Arc::new(Reconciler::new(
        config.into_shared(),
        Arc::new(KubeApplicationStore::new(client.clone())),
        Arc::new(ClusterApplications::new(
            client.clone(),
            Arc::new(HelmTemplateRenderer::default()),
        )),
        Arc::new(KubeEventSink::new(client.clone(), &zone_id)),
        Arc::new(SystemClock),
    ));

    reconcile_existing_resources(&applications, &reconciler).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        applications,
        reconciler,
        server_state,
        otel_tracer_provider,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    config: &ControllerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.server.startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.server.poll_interval_ms);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.is_serving() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Reconcile existing AnyApplications before the watch starts
///
/// Failures are logged; the watch retries them.
async fn reconcile_existing_resources(
    applications: &Api<AnyApplication>,
    reconciler: &Arc<Reconciler>,
) {
    let existing_resources_span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.reconcile_existing",
        operation = "reconcile_existing_resources"
    );
    let _guard = existing_resources_span.enter();

    let list = match applications.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
            return;
        }
    };

    if list.items.is_empty() {
        info!("No existing AnyApplication resources found, watch will pick up new resources");
        return;
    }
    info!(
        "Reconciling {} existing AnyApplication resources before starting watch...",
        list.items.len()
    );

    for item in list.items {
        let id = item.application_id();
        match reconcile(Arc::new(item), Arc::clone(reconciler)).await {
            Ok(_) => info!(application = %id, "reconciliation.success"),
            Err(e) => error!(application = %id, error = %e, "reconciliation.error"),
        }
    }
}
