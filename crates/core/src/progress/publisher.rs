//! Write-through progress publisher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::JobEvent;
use crate::collaborator::RecipePayload;
use crate::confirmation::PendingUpload;
use crate::history::{HistoryEntry, HistoryError, HistoryStatus, HistoryStore, NewHistoryEntry};
use crate::job::{Job, JobStatus, JobStore, JobStoreError, ProgressUpdate, Stage};
use crate::metrics;

/// Default capacity of each broadcast channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Errors from publishing progress.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    JobStore(#[from] JobStoreError),

    #[error(transparent)]
    History(#[from] HistoryError),

    /// Terminal stages are reached through the terminal operations only.
    #[error("Stage '{0}' cannot be reported as progress")]
    TerminalStage(Stage),
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct JobCompletion {
    pub recipe: RecipePayload,
    /// Image uploaded with the recipe.
    pub thumbnail: Option<String>,
    pub uploaded_to: Vec<String>,
    pub failed_targets: Vec<String>,
}

/// Fans job progress out to subscribers while writing it through to the
/// job store.
///
/// The store write and the broadcast for a job happen under one lock, so
/// subscribers see events in store order and never see progress after a
/// terminal event. Terminal operations additionally write the job's single
/// [`HistoryEntry`](crate::history::HistoryEntry) before moving the job to
/// its terminal status, so a failed history write leaves the job open for a
/// retry instead of finished without an entry.
pub struct ProgressPublisher {
    jobs: Arc<dyn JobStore>,
    history: Arc<dyn HistoryStore>,
    global: broadcast::Sender<JobEvent>,
    channels: Mutex<HashMap<String, broadcast::Sender<JobEvent>>>,
    capacity: usize,
}

impl ProgressPublisher {
    pub fn new(jobs: Arc<dyn JobStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self::with_capacity(jobs, history, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(
        jobs: Arc<dyn JobStore>,
        history: Arc<dyn HistoryStore>,
        capacity: usize,
    ) -> Self {
        let (global, _) = broadcast::channel(capacity);
        Self {
            jobs,
            history,
            global,
            channels: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// The job store this publisher writes through to.
    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Subscribe to events for every job.
    pub fn subscribe_all(&self) -> broadcast::Receiver<JobEvent> {
        self.global.subscribe()
    }

    /// Subscribe to events for one job.
    ///
    /// The stream ends after the job's terminal event. Subscribing to a job
    /// that is already terminal yields a stream that is closed immediately.
    pub fn subscribe_job(&self, job_id: &str) -> Result<broadcast::Receiver<JobEvent>, PublishError> {
        let mut channels = self.channels();
        if let Some(sender) = channels.get(job_id) {
            return Ok(sender.subscribe());
        }

        let job = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;

        let (sender, receiver) = broadcast::channel(self.capacity);
        if !job.is_terminal() {
            channels.insert(job_id.to_string(), sender);
        }
        Ok(receiver)
    }

    /// Announce a newly submitted job.
    pub fn announce_created(&self, job: &Job) {
        let channels = self.channels();
        self.emit(
            &channels,
            JobEvent::Created {
                job_id: job.id.clone(),
                url: job.url.clone(),
            },
        );
    }

    /// Record progress for a running job.
    ///
    /// Returns `false` (and emits nothing) when the job is already terminal,
    /// e.g. because it was cancelled while the stage was running.
    pub fn update_progress(&self, job_id: &str, update: ProgressUpdate) -> Result<bool, PublishError> {
        if update.stage.status().is_terminal() {
            return Err(PublishError::TerminalStage(update.stage));
        }

        let channels = self.channels();
        let Some(job) = self.jobs.update_progress(job_id, &update)? else {
            debug!(job_id = %job_id, stage = %update.stage, "Ignoring progress for finished job");
            return Ok(false);
        };

        if job.progress > update.percent {
            warn!(
                job_id = %job_id,
                stage = %update.stage,
                reported = update.percent,
                stored = job.progress,
                "Progress went backwards, keeping the higher value"
            );
        }

        self.emit(&channels, JobEvent::progress(&job));
        Ok(true)
    }

    /// Announce a recipe waiting at the confirmation gate.
    pub fn emit_preview(&self, upload: &PendingUpload) {
        let channels = self.channels();
        self.emit(&channels, JobEvent::preview(upload));
    }

    /// Finish a job successfully.
    ///
    /// Returns `false` if the job was already terminal; nothing is written
    /// or emitted in that case.
    pub fn complete_job(&self, job_id: &str, completion: JobCompletion) -> Result<bool, PublishError> {
        let message = if completion.uploaded_to.is_empty() {
            "Recipe created".to_string()
        } else {
            format!("Recipe uploaded to {}", completion.uploaded_to.join(", "))
        };

        let recipe_name = completion
            .recipe
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string);

        let event = JobEvent::Completed {
            job_id: job_id.to_string(),
            recipe_name,
            recipe: completion.recipe.clone(),
            uploaded_to: completion.uploaded_to.clone(),
            failed_targets: completion.failed_targets,
        };

        self.finish(
            job_id,
            JobStatus::Completed,
            &message,
            None,
            Outcome {
                recipe: Some(completion.recipe),
                thumbnail: completion.thumbnail,
                output_targets: completion.uploaded_to,
            },
            event,
        )
    }

    /// Finish a job as failed. `error` becomes the job's error message.
    pub fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        recipe: Option<RecipePayload>,
    ) -> Result<bool, PublishError> {
        let event = JobEvent::Failed {
            job_id: job_id.to_string(),
            error: error.to_string(),
        };
        self.finish(
            job_id,
            JobStatus::Failed,
            error,
            Some(error),
            Outcome::with_recipe(recipe),
            event,
        )
    }

    /// Finish a job as cancelled.
    pub fn cancel_job(
        &self,
        job_id: &str,
        reason: &str,
        recipe: Option<RecipePayload>,
    ) -> Result<bool, PublishError> {
        let event = JobEvent::Cancelled {
            job_id: job_id.to_string(),
            reason: reason.to_string(),
        };
        self.finish(
            job_id,
            JobStatus::Cancelled,
            reason,
            None,
            Outcome::with_recipe(recipe),
            event,
        )
    }

    /// Delete a job's history entry, and its job record once terminal.
    pub fn forget_job(&self, job_id: &str) -> Result<HistoryEntry, PublishError> {
        let _channels = self.channels();
        let entry = self.history.delete(job_id)?;
        if let Some(job) = self.jobs.get(job_id)? {
            if job.is_terminal() {
                self.jobs.delete(job_id)?;
            }
        }
        debug!(job_id = %job_id, "Job forgotten");
        Ok(entry)
    }

    fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        message: &str,
        error_message: Option<&str>,
        outcome: Outcome,
        event: JobEvent,
    ) -> Result<bool, PublishError> {
        let mut channels = self.channels();

        let current = self
            .jobs
            .get(job_id)?
            .ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        if current.is_terminal() {
            debug!(job_id = %job_id, status = %current.status, "Job already finished, ignoring");
            return Ok(false);
        }

        // History goes first. `record` is insert-once, so a call retried
        // after a failed status write finds its entry and moves on.
        let history_status = HistoryStatus::from_job_status(status).unwrap_or(HistoryStatus::Failed);
        let recorded = self.history.record(NewHistoryEntry {
            job_id: current.id.clone(),
            url: current.url.clone(),
            video_title: current.video_title.clone(),
            recipe: outcome.recipe,
            thumbnail: outcome.thumbnail,
            status: history_status,
            error_message: error_message.map(str::to_string),
            output_targets: outcome.output_targets,
        })?;

        if self.jobs.finish(job_id, status, message, error_message)?.is_none() {
            debug!(job_id = %job_id, status = %status, "Job finished concurrently, ignoring");
            return Ok(false);
        }
        if !recorded {
            warn!(job_id = %job_id, "History entry already existed for job, keeping it");
        }

        metrics::JOBS_FINISHED.with_label_values(&[status.as_str()]).inc();
        info!(job_id = %job_id, status = %status, message = %message, "Job finished");

        self.emit(&channels, event);
        // Dropping the sender ends every per-job stream after this event
        channels.remove(job_id);
        Ok(true)
    }

    fn emit(&self, channels: &HashMap<String, broadcast::Sender<JobEvent>>, event: JobEvent) {
        if let Some(sender) = channels.get(event.job_id()) {
            let _ = sender.send(event.clone());
        }
        // No receivers is fine
        let _ = self.global.send(event);
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<JobEvent>>> {
        self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Outcome {
    recipe: Option<RecipePayload>,
    thumbnail: Option<String>,
    output_targets: Vec<String>,
}

impl Outcome {
    fn with_recipe(recipe: Option<RecipePayload>) -> Self {
        Self {
            recipe,
            thumbnail: None,
            output_targets: Vec::new(),
        }
    }
}
