//! # Watch Loop
//!
//! Runs the kube-runtime controller over all AnyApplications until a shutdown
//! signal arrives. Stream errors are classified by the error policy, which
//! decides whether the controller is rebuilt.

use crate::constants;
use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::crd::AnyApplication;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::server::ServerState;
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::watcher;
use kube_runtime::controller::{Controller, Error as ControllerError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watch and reconcile until the process is asked to stop
///
/// Readiness is reported once the first controller is built. Running jobs
/// are cancelled before returning.
pub async fn run_watch_loop(
    applications: Api<AnyApplication>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let backoff_ms = Arc::new(AtomicU64::new(constants::DEFAULT_WATCH_BACKOFF_MIN_MS));

    loop {
        let mut stream = Controller::new(applications.clone(), watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .boxed();
        server_state.mark_ready();

        let mut restart = false;
        while let Some(result) = stream.next().await {
            match result {
                Ok((object, _action)) => {
                    backoff_ms.store(constants::DEFAULT_WATCH_BACKOFF_MIN_MS, Ordering::Relaxed);
                    debug!("Reconciled {}", object);
                }
                // already handled by the error policy
                Err(ControllerError::<ReconcilerError, watcher::Error>::ReconcilerFailed(e, object)) => {
                    debug!("Reconciliation of {} failed: {}", object, e);
                }
                Err(e) => {
                    let message = e.to_string();
                    if handle_watch_stream_error(
                        &message,
                        &backoff_ms,
                        constants::DEFAULT_WATCH_BACKOFF_MAX_MS,
                    )
                    .await
                    .is_none()
                    {
                        restart = true;
                        break;
                    }
                }
            }
        }

        if !restart {
            break;
        }
        warn!("Restarting AnyApplication watch");
    }

    info!("Shutdown requested, stopping {} running jobs", reconciler.jobs().len());
    reconciler.stop_all_jobs();
    Ok(())
}
