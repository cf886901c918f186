//! # AACTL CLI
//!
//! Command-line interface for AnyApplication resources.
//!
//! ## Usage
//!
//! ```bash
//! # Trigger reconciliation of an AnyApplication
//! aactl reconcile -n default nginx-app
//!
//! # List AnyApplications with their state and owner zone
//! aactl list
//!
//! # Show placements and per-zone conditions of an AnyApplication
//! aactl status -n default nginx-app
//! ```

use anyapplication_controller::crd::AnyApplication;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use serde_json::json;

/// Annotation bumped by `aactl reconcile`
const RECONCILE_ANNOTATION: &str = "dcp.hiro.io/reconcile";

/// AnyApplication CLI
#[derive(Debug, Parser)]
#[command(name = "aactl")]
#[command(about = "AnyApplication controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Trigger reconciliation of an AnyApplication
    Reconcile {
        /// Name of the AnyApplication
        name: String,
    },
    /// List AnyApplications (all namespaces unless --namespace is given)
    List,
    /// Show the status of an AnyApplication
    Status {
        /// Name of the AnyApplication
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aactl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Reconcile { name } => reconcile_command(client, &name, cli.namespace).await,
        Commands::List => list_command(client, cli.namespace).await,
        Commands::Status { name } => status_command(client, &name, cli.namespace).await,
    }
}

/// Trigger reconciliation by updating an annotation the controller watches
async fn reconcile_command(client: Client, name: &str, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<AnyApplication> = Api::namespaced(client, ns);

    let timestamp = chrono::Utc::now().to_rfc3339();
    let patch = json!({
        "metadata": {
            "annotations": {
                RECONCILE_ANNOTATION: timestamp
            }
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to trigger reconciliation for '{ns}/{name}'"))?;

    println!("✅ Reconciliation triggered for {ns}/{name} at {timestamp}");
    Ok(())
}

async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<AnyApplication> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let applications = api
        .list(&ListParams::default())
        .await
        .context("Failed to list AnyApplication resources")?;

    if applications.items.is_empty() {
        println!("No AnyApplication resources found.");
        return Ok(());
    }

    println!(
        "{:<30} {:<20} {:<18} {:<15} {:<20}",
        "NAME", "NAMESPACE", "STATE", "OWNER", "PLACEMENTS"
    );
    println!("{}", "-".repeat(103));
    for application in applications.items {
        let id = application.application_id();
        let status = application.status_or_default();
        let placements: Vec<&str> = status.placements.iter().map(|p| p.zone.as_str()).collect();
        println!(
            "{:<30} {:<20} {:<18} {:<15} {:<20}",
            id.name,
            id.namespace,
            status.state,
            if status.owner.is_empty() { "-" } else { status.owner.as_str() },
            if placements.is_empty() { "-".to_string() } else { placements.join(",") }
        );
    }
    Ok(())
}

async fn status_command(client: Client, name: &str, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<AnyApplication> = Api::namespaced(client, ns);
    let application = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get AnyApplication '{ns}/{name}'"))?;

    println!("AnyApplication {ns}/{name}\n");
    if let Some(helm) = &application.spec.application.helm {
        println!("Source: {} {} ({})", helm.chart, helm.version, helm.repository);
    }
    println!("Zones: {}", application.spec.zones);
    println!("Placement strategy: {:?}", application.spec.placement_strategy.strategy);
    println!(
        "Recover strategy: tolerance={}, max-retries={}",
        application.spec.recover_strategy.tolerance,
        application.spec.recover_strategy.max_attempts()
    );

    let Some(status) = &application.status else {
        println!("\nStatus: not reconciled yet");
        return Ok(());
    };
    println!("\nState: {}", status.state);
    println!("Owner: {}", status.owner);
    for placement in &status.placements {
        println!("Placement: {}", placement.zone);
    }
    for zone in &status.zones {
        println!("\nZone {} (version {})", zone.zone_id, zone.zone_version);
        for condition in &zone.conditions {
            println!(
                "  {:<18} {:<12} {}",
                condition.r#type, condition.status, condition.last_transition_time
            );
            if !condition.reason.is_empty() {
                println!("    Reason: {}", condition.reason);
            }
            if !condition.msg.is_empty() {
                println!("    Message: {}", condition.msg);
            }
        }
    }
    Ok(())
}
