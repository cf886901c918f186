//! # AnyApplication Controller
//!
//! A Kubernetes controller that places, deploys, monitors and relocates
//! AnyApplication workloads across independently operated zones.
//!
//! ## Overview
//!
//! Every zone runs one instance of this controller against its own cluster.
//! All instances watch the same AnyApplication resources and coordinate only
//! through their status:
//!
//! 1. **Placement** - the first zone to see an application becomes its owner and
//!    decides (or waits for) the zones it runs in
//! 2. **Deployment** - every placed zone renders the application's Helm chart and
//!    applies it to its cluster
//! 3. **Operation** - placed zones report the aggregated health of the resources
//! 4. **Relocation** - zones no longer placed remove the application, newly
//!    placed zones deploy it
//!
//! ## Usage
//!
//! ```bash
//! anyapplication-controller --config /etc/dcp/application-controller.yaml
//! ```
//!
//! See the [README.md](../README.md) for configuration keys.

use anyapplication_controller::observability;
use anyapplication_controller::runtime::{initialize, run_watch_loop, ControllerArgs};
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = ControllerArgs::parse();
    let init_result = initialize(args).await?;

    run_watch_loop(
        init_result.applications,
        init_result.reconciler,
        init_result.server_state,
    )
    .await?;

    // Shutdown OpenTelemetry tracer provider if it was initialized
    observability::otel::shutdown_otel(init_result.otel_tracer_provider);

    Ok(())
}
