//! Per-job handle given to pipeline bodies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::Job;

/// Returned by [`JobHandle::checkpoint`] once the job has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Job was cancelled")]
pub struct Cancelled;

/// A running job's view of its cancellation flag.
///
/// Cancellation is cooperative: bodies poll the flag between stages.
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: String,
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    pub(crate) fn new(job_id: impl Into<String>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            job_id: job_id.into(),
            cancelled,
        }
    }

    /// A handle not registered with any scheduler. It is only cancelled
    /// through [`JobHandle::cancel`].
    pub fn detached(job_id: impl Into<String>) -> Self {
        Self::new(job_id, Arc::new(AtomicBool::new(false)))
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the job has been cancelled.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Raise the cancellation flag.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// The work a scheduler runs for each admitted job.
///
/// Bodies own the job's business stages: they report progress and must end
/// every run in exactly one terminal publisher call. A body that panics is
/// failed by the scheduler instead.
#[async_trait]
pub trait PipelineBody: Send + Sync {
    async fn run(&self, job: Job, handle: JobHandle);
}
