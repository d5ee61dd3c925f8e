//! Types for the job scheduler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::JobStoreError;
use crate::progress::PublishError;

/// Errors that can occur while scheduling jobs.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Submitted URL is not an http(s) URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Job not found.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Job already has a running or queued pipeline.
    #[error("job already started: {0}")]
    AlreadyStarted(String),

    /// Job reached a terminal status before it could start.
    #[error("job already finished: {0}")]
    AlreadyFinished(String),

    /// The scheduler no longer admits jobs.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// Job store error.
    #[error("job store error: {0}")]
    JobStore(#[from] JobStoreError),

    /// Progress publisher error.
    #[error("publisher error: {0}")]
    Publish(#[from] PublishError),
}

/// Current load of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Concurrency bound.
    pub max_concurrent_jobs: usize,
    /// Pipelines currently holding a permit.
    pub running: usize,
    /// Started jobs waiting for a permit.
    pub queued: usize,
}
