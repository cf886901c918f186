//! # Error Policy
//!
//! Error handling and backoff for the controller watch loop: reconciliation
//! errors get a per-resource Fibonacci requeue, watch stream errors are
//! classified and either restart the watch or are skipped.

use crate::constants;
use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::AnyApplication;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing application does not
/// slow down the others. A successful reconciliation resets it.
pub fn handle_reconciliation_error(
    application: Arc<AnyApplication>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = application.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = application.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {:?}", namespace, name, error);
    metrics::increment_reconciliation_errors();

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(resource_key).or_insert_with(|| {
                BackoffState::new(
                    constants::DEFAULT_ERROR_BACKOFF_MIN_SECS,
                    constants::DEFAULT_ERROR_BACKOFF_MAX_SECS,
                )
            });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// How the watch loop should treat a stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    TooManyRequests,
    NotFound,
    Other,
}

impl WatchErrorKind {
    pub fn classify(error: &str) -> Self {
        if error.contains("401") || error.contains("Unauthorized") {
            Self::Unauthorized
        } else if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            Self::Expired
        } else if error.contains("429")
            || error.contains("storage is (re)initializing")
            || error.contains("TooManyRequests")
        {
            Self::TooManyRequests
        } else if error.contains("ObjectNotFound")
            || (error.contains("404") && error.contains("not found"))
        {
            Self::NotFound
        } else {
            Self::Other
        }
    }
}

/// Handle watch stream errors with classification and backoff
///
/// Returns `None` when the watch should restart, `Some(())` to keep consuming
/// the stream.
pub async fn handle_watch_stream_error(
    error: &str,
    backoff_ms: &Arc<AtomicU64>,
    max_backoff_ms: u64,
) -> Option<()> {
    let error_span = tracing::span!(tracing::Level::WARN, "controller.watch.error", error = %error);
    let _error_guard = error_span.enter();

    match WatchErrorKind::classify(error) {
        WatchErrorKind::Unauthorized => {
            error!("❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("   Verify access: kubectl auth can-i watch anyapplications --as=system:serviceaccount:<namespace>:anyapplication-controller --all-namespaces");
            warn!(
                "⏳ Waiting {}s before retrying watch...",
                constants::DEFAULT_WATCH_RESTART_DELAY_SECS
            );
            tokio::time::sleep(Duration::from_secs(constants::DEFAULT_WATCH_RESTART_DELAY_SECS)).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            None
        }
        WatchErrorKind::TooManyRequests => {
            let current = backoff_ms.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff_ms.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!("Resource not found (likely deleted), continuing watch...");
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error);
            tokio::time::sleep(Duration::from_secs(constants::DEFAULT_WATCH_RESTART_DELAY_SECS)).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_watch_errors() {
        let cases = [
            ("ApiError: Unauthorized (401)", WatchErrorKind::Unauthorized),
            ("too old resource version: 123 (456)", WatchErrorKind::Expired),
            ("storage is (re)initializing", WatchErrorKind::TooManyRequests),
            ("ObjectNotFound: default/app", WatchErrorKind::NotFound),
            ("connection reset by peer", WatchErrorKind::Other),
        ];
        for (error, expected) in cases {
            assert_eq!(WatchErrorKind::classify(error), expected, "{error}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_many_requests_doubles_backoff() {
        let backoff = Arc::new(AtomicU64::new(500));
        let result = handle_watch_stream_error("429 TooManyRequests", &backoff, 800).await;
        assert_eq!(result, None);
        assert_eq!(backoff.load(Ordering::Relaxed), 800);
    }
}
