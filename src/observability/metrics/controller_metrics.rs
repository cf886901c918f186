//! # Controller Metrics
//!
//! Metrics for reconciliations, async jobs and status writes.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "anyapplication_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "anyapplication_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "anyapplication_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

// Job metrics
static JOBS_STARTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "anyapplication_jobs_started_total",
            "Total number of async jobs started",
        ),
        &["job_type"],
    )
    .expect("Failed to create JOBS_STARTED_TOTAL metric - this should never happen")
});

static JOBS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("anyapplication_jobs_active", "Number of running async jobs")
        .expect("Failed to create JOBS_ACTIVE metric - this should never happen")
});

// Status metrics
static STATUS_UPDATES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "anyapplication_status_updates_total",
        "Total number of accepted status writes",
    )
    .expect("Failed to create STATUS_UPDATES_TOTAL metric - this should never happen")
});

static STATUS_UPDATE_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "anyapplication_status_update_conflicts_total",
        "Total number of status writes rejected with a version conflict",
    )
    .expect("Failed to create STATUS_UPDATE_CONFLICTS_TOTAL metric - this should never happen")
});

static GLOBAL_STATE_TRANSITIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "anyapplication_global_state_transitions_total",
            "Total number of global state transitions, by target state",
        ),
        &["state"],
    )
    .expect("Failed to create GLOBAL_STATE_TRANSITIONS_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(JOBS_STARTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOBS_ACTIVE.clone()))?;
    REGISTRY.register(Box::new(STATUS_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_UPDATE_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GLOBAL_STATE_TRANSITIONS_TOTAL.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILE_DURATION.observe(duration);
}

pub fn increment_jobs_started(job_type: &str) {
    JOBS_STARTED_TOTAL.with_label_values(&[job_type]).inc();
}

pub fn increment_jobs_active() {
    JOBS_ACTIVE.inc();
}

pub fn decrement_jobs_active() {
    JOBS_ACTIVE.dec();
}

pub fn increment_status_updates() {
    STATUS_UPDATES_TOTAL.inc();
}

pub fn increment_status_update_conflicts() {
    STATUS_UPDATE_CONFLICTS_TOTAL.inc();
}

pub fn increment_global_state_transitions(state: &str) {
    GLOBAL_STATE_TRANSITIONS_TOTAL
        .with_label_values(&[state])
        .inc();
}
