//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Scheduler (submissions, running and queued pipelines)
//! - Job outcomes and stage durations
//! - Confirmation gate outcomes
//! - Recipe exports per target
//! - Startup recovery

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Scheduler Metrics
// =============================================================================

/// Jobs submitted total.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("recipes_jobs_submitted_total", "Total jobs submitted").unwrap()
});

/// Jobs reaching a terminal status, by status.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("recipes_jobs_finished_total", "Total jobs finished"),
        &["status"], // "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Pipelines currently holding a concurrency permit.
pub static PIPELINES_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "recipes_pipelines_running",
        "Number of pipelines currently running",
    )
    .unwrap()
});

/// Jobs started but waiting for a concurrency permit.
pub static JOBS_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "recipes_jobs_queued",
        "Number of jobs waiting for a concurrency slot",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Time spent in each pipeline stage.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "recipes_stage_duration_seconds",
            "Duration of pipeline stages",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["stage"],
    )
    .unwrap()
});

/// Confirmation gate outcomes.
pub static CONFIRMATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "recipes_confirmations_total",
            "Total upload confirmations by outcome",
        ),
        &["outcome"], // "confirmed", "cancelled", "timed_out", "job_cancelled"
    )
    .unwrap()
});

/// Export attempts by target and result.
pub static EXPORTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("recipes_exports_total", "Total recipe exports"),
        &["target", "result"], // result: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Recovery Metrics
// =============================================================================

/// Jobs failed by the startup recovery sweep.
pub static RECOVERED_JOBS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "recipes_recovered_jobs_total",
        "Jobs marked failed by the startup recovery sweep",
    )
    .unwrap()
});

/// Pending uploads removed by the startup recovery sweep.
pub static RECOVERED_UPLOADS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "recipes_recovered_uploads_total",
        "Orphaned pending uploads removed by the startup recovery sweep",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Scheduler
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(PIPELINES_RUNNING.clone()),
        Box::new(JOBS_QUEUED.clone()),
        // Pipeline
        Box::new(STAGE_DURATION.clone()),
        Box::new(CONFIRMATIONS.clone()),
        Box::new(EXPORTS.clone()),
        // Recovery
        Box::new(RECOVERED_JOBS.clone()),
        Box::new(RECOVERED_UPLOADS.clone()),
    ]
}
