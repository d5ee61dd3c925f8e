//! Bounded job scheduler with cooperative cancellation.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::{JobHandle, PipelineBody, SchedulerConfig, SchedulerError, SchedulerStatus};
use crate::job::{Job, JobStore, JobStoreError};
use crate::metrics;
use crate::pipeline::PipelineError;
use crate::progress::{ProgressPublisher, PublishError};

/// Reason recorded when a user cancels a job.
pub const CANCELLED_BY_USER: &str = "Cancelled by user";

type FlagTable = HashMap<String, Arc<AtomicBool>>;

/// Admits jobs into at most `max_concurrent_jobs` running pipelines.
///
/// Excess jobs queue on a counting semaphore rather than being rejected.
/// Cancellation flags live in a table owned by the scheduler; entries exist
/// from `start` until the job's pipeline body returns.
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: SchedulerConfig,
    publisher: Arc<ProgressPublisher>,
    permits: Arc<Semaphore>,
    flags: Mutex<FlagTable>,
    running: AtomicUsize,
    queued: AtomicUsize,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, publisher: Arc<ProgressPublisher>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            inner: Arc::new(Inner {
                config,
                publisher,
                permits,
                flags: Mutex::new(HashMap::new()),
                running: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
            }),
        }
    }

    pub fn publisher(&self) -> &Arc<ProgressPublisher> {
        &self.inner.publisher
    }

    /// Create a job in `pending`. Does not start it.
    pub fn submit(&self, url: &str) -> Result<Job, SchedulerError> {
        if self.inner.permits.is_closed() {
            return Err(SchedulerError::ShuttingDown);
        }

        let url = url.trim();
        let parsed =
            reqwest::Url::parse(url).map_err(|e| SchedulerError::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SchedulerError::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                url,
                parsed.scheme()
            )));
        }

        let job = self.jobs().create(url)?;
        metrics::JOBS_SUBMITTED.inc();
        info!(job_id = %job.id, url = %job.url, "Job submitted");

        self.inner.publisher.announce_created(&job);
        Ok(job)
    }

    /// Queue a job's pipeline body behind the concurrency bound.
    ///
    /// Returns once the job is queued; the body runs on its own task after a
    /// permit is acquired, unless the job was cancelled in the meantime.
    pub fn start(&self, job_id: &str, body: Arc<dyn PipelineBody>) -> Result<(), SchedulerError> {
        if self.inner.permits.is_closed() {
            return Err(SchedulerError::ShuttingDown);
        }

        let job = self
            .jobs()
            .get(job_id)?
            .ok_or_else(|| SchedulerError::JobNotFound(job_id.to_string()))?;
        if job.is_terminal() {
            return Err(SchedulerError::AlreadyFinished(job_id.to_string()));
        }

        let flag = {
            let mut flags = self.inner.flags();
            if flags.contains_key(job_id) {
                return Err(SchedulerError::AlreadyStarted(job_id.to_string()));
            }
            let flag = Arc::new(AtomicBool::new(false));
            flags.insert(job_id.to_string(), Arc::clone(&flag));
            flag
        };

        let handle = JobHandle::new(job_id, flag);
        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        metrics::JOBS_QUEUED.inc();
        debug!(job_id = %job_id, "Job queued");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run(handle, body).await;
        });
        Ok(())
    }

    /// Submit a URL and immediately queue its pipeline.
    pub fn submit_and_start(&self, url: &str, body: Arc<dyn PipelineBody>) -> Result<Job, SchedulerError> {
        let job = self.submit(url)?;
        self.start(&job.id, body)?;
        Ok(job)
    }

    /// Cancel a job.
    ///
    /// Raises the job's cancellation flag and marks it `cancelled` in the
    /// store. Returns `false` if the job is unknown or already terminal.
    /// A running pipeline stops at its next checkpoint.
    pub fn cancel(&self, job_id: &str) -> Result<bool, SchedulerError> {
        if let Some(flag) = self.inner.flags().get(job_id) {
            flag.store(true, Ordering::SeqCst);
        }

        match self.inner.publisher.cancel_job(job_id, CANCELLED_BY_USER, None) {
            Ok(cancelled) => {
                if cancelled {
                    info!(job_id = %job_id, "Job cancelled");
                }
                Ok(cancelled)
            }
            Err(PublishError::JobStore(JobStoreError::NotFound(_))) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the job's cancellation flag is raised.
    ///
    /// Only jobs started on this scheduler have a flag; others report `false`.
    pub fn is_cancelled(&self, job_id: &str) -> bool {
        self.inner
            .flags()
            .get(job_id)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            max_concurrent_jobs: self.inner.config.max_concurrent_jobs,
            running: self.inner.running.load(Ordering::SeqCst),
            queued: self.inner.queued.load(Ordering::SeqCst),
        }
    }

    /// Stop admitting jobs.
    ///
    /// Queued jobs are left in `pending`. Running pipelines are not
    /// interrupted; if the process exits before they finish, the next
    /// startup's recovery sweep fails them.
    pub fn shutdown(&self) {
        let status = self.status();
        self.inner.permits.close();
        info!(
            running = status.running,
            queued = status.queued,
            "Scheduler stopped admitting jobs"
        );
    }

    fn jobs(&self) -> &Arc<dyn JobStore> {
        self.inner.publisher.jobs()
    }
}

impl Inner {
    async fn run(&self, handle: JobHandle, body: Arc<dyn PipelineBody>) {
        let job_id = handle.job_id().to_string();
        let permit = Arc::clone(&self.permits).acquire_owned().await;

        self.queued.fetch_sub(1, Ordering::SeqCst);
        metrics::JOBS_QUEUED.dec();

        let Ok(permit) = permit else {
            debug!(job_id = %job_id, "Scheduler closed before job was admitted");
            self.flags().remove(&job_id);
            return;
        };

        if let Some(job) = self.admit(&handle) {
            self.running.fetch_add(1, Ordering::SeqCst);
            metrics::PIPELINES_RUNNING.inc();
            debug!(job_id = %job_id, "Pipeline started");

            let outcome = AssertUnwindSafe(body.run(job, handle)).catch_unwind().await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            metrics::PIPELINES_RUNNING.dec();

            if outcome.is_err() {
                error!(job_id = %job_id, "Pipeline body panicked");
                let message = PipelineError::Crashed.to_string();
                if let Err(e) = self.publisher.fail_job(&job_id, &message, None) {
                    error!(job_id = %job_id, error = %e, "Failed to record crashed pipeline");
                }
            }
        }

        drop(permit);
        self.flags().remove(&job_id);
    }

    /// The job to run, or `None` if it was cancelled or finished while queued.
    fn admit(&self, handle: &JobHandle) -> Option<Job> {
        if handle.is_cancelled() {
            debug!(job_id = %handle.job_id(), "Job cancelled while queued");
            return None;
        }

        match self.publisher.jobs().get(handle.job_id()) {
            Ok(Some(job)) if !job.is_terminal() => Some(job),
            Ok(Some(job)) => {
                debug!(job_id = %job.id, status = %job.status, "Job finished while queued");
                None
            }
            Ok(None) => {
                warn!(job_id = %handle.job_id(), "Job disappeared while queued");
                None
            }
            Err(e) => {
                error!(job_id = %handle.job_id(), error = %e, "Failed to load queued job");
                if let Err(e) = self.publisher.fail_job(handle.job_id(), &e.to_string(), None) {
                    error!(job_id = %handle.job_id(), error = %e, "Failed to record job failure");
                }
                None
            }
        }
    }

    fn flags(&self) -> MutexGuard<'_, FlagTable> {
        self.flags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
