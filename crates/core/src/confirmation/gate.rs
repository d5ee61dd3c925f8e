//! Confirm-before-upload gate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use super::{
    ConfirmationConfig, NewPendingUpload, PendingUpload, PendingUploadError, PendingUploadStore,
    UploadResolution, UploadStatus,
};
use crate::collaborator::{ExportTarget, ImageCandidates, RecipePayload};
use crate::job::JobStore;
use crate::metrics;
use crate::scheduler::JobHandle;

/// Errors from the confirmation gate.
#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error(transparent)]
    Store(#[from] PendingUploadError),
}

/// How a parked pipeline's wait ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    /// Approved. Carries the resolved upload with the final image choice.
    Confirmed(PendingUpload),
    /// Rejected by a human, or the record was removed.
    Cancelled,
    /// Nobody decided before the upload expired.
    TimedOut,
    /// The owning job was cancelled while parked, in this process or
    /// (when the gate can read the job store) in any other.
    JobCancelled,
}

impl ConfirmationOutcome {
    fn label(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Confirmed(_) => "confirmed",
            ConfirmationOutcome::Cancelled => "cancelled",
            ConfirmationOutcome::TimedOut => "timed_out",
            ConfirmationOutcome::JobCancelled => "job_cancelled",
        }
    }
}

/// Parks pipelines until their pending upload is resolved.
///
/// A waiter wakes either on an in-process signal (the decision arrived on
/// this gate) or on its periodic re-read of the store (the decision arrived
/// anywhere else). Both paths go through the store's atomic resolve, so
/// each upload is resolved exactly once.
pub struct ConfirmationGate {
    config: ConfirmationConfig,
    store: Arc<dyn PendingUploadStore>,
    jobs: Option<Arc<dyn JobStore>>,
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
}

impl ConfirmationGate {
    pub fn new(config: ConfirmationConfig, store: Arc<dyn PendingUploadStore>) -> Self {
        Self {
            config,
            store,
            jobs: None,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Let waiters see jobs finished by other processes.
    pub fn with_job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &ConfirmationConfig {
        &self.config
    }

    /// Create the pending upload for a job's recipe.
    pub fn open(
        &self,
        job_id: &str,
        recipe: RecipePayload,
        candidates: &ImageCandidates,
        targets: Vec<ExportTarget>,
    ) -> Result<PendingUpload, ConfirmationError> {
        let window = chrono::Duration::from_std(self.config.timeout())
            .unwrap_or_else(|_| chrono::Duration::minutes(5));

        let image_candidates: Vec<String> = candidates
            .paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let best_image_index = candidates.best().map(|_| candidates.best_index);

        let upload = self.store.create(NewPendingUpload {
            job_id: job_id.to_string(),
            recipe,
            image_candidates,
            best_image_index,
            targets,
            expires_at: Utc::now() + window,
        })?;

        self.waiters()
            .insert(upload.id.clone(), Arc::new(Notify::new()));

        info!(
            job_id = %job_id,
            upload_id = %upload.id,
            expires_at = %upload.expires_at,
            "Upload awaiting confirmation"
        );
        Ok(upload)
    }

    /// Block until the upload is resolved, expires, or its job is cancelled.
    ///
    /// The upload record is deleted before this returns, whatever the
    /// outcome.
    pub async fn wait(
        &self,
        upload: &PendingUpload,
        handle: &JobHandle,
    ) -> Result<ConfirmationOutcome, ConfirmationError> {
        let notify = Arc::clone(
            self.waiters()
                .entry(upload.id.clone())
                .or_insert_with(|| Arc::new(Notify::new())),
        );

        let remaining = (upload.expires_at - Utc::now()).to_std().unwrap_or_default();
        let deadline = Instant::now() + remaining;

        let result = self.wait_until(upload, handle, &notify, deadline).await;

        self.waiters().remove(&upload.id);
        if let Err(e) = self.store.delete(&upload.id) {
            warn!(upload_id = %upload.id, error = %e, "Failed to delete resolved upload");
        }

        if let Ok(outcome) = &result {
            metrics::CONFIRMATIONS.with_label_values(&[outcome.label()]).inc();
            info!(
                job_id = %upload.job_id,
                upload_id = %upload.id,
                outcome = outcome.label(),
                "Confirmation wait finished"
            );
        }
        result
    }

    async fn wait_until(
        &self,
        upload: &PendingUpload,
        handle: &JobHandle,
        notify: &Notify,
        deadline: Instant,
    ) -> Result<ConfirmationOutcome, ConfirmationError> {
        loop {
            if handle.is_cancelled() || self.job_finished_elsewhere(&upload.job_id) {
                match self.store.resolve(&upload.id, UploadResolution::Cancel) {
                    Ok(_) | Err(PendingUploadError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                return Ok(ConfirmationOutcome::JobCancelled);
            }

            let Some(current) = self.store.get(&upload.id)? else {
                debug!(upload_id = %upload.id, "Upload record removed while waiting");
                return Ok(ConfirmationOutcome::Cancelled);
            };

            match current.status {
                UploadStatus::Confirmed => return Ok(ConfirmationOutcome::Confirmed(current)),
                UploadStatus::Cancelled => return Ok(ConfirmationOutcome::Cancelled),
                UploadStatus::Expired => return Ok(ConfirmationOutcome::TimedOut),
                UploadStatus::Pending => {}
            }

            if Instant::now() >= deadline {
                match self.store.resolve(&upload.id, UploadResolution::Expire) {
                    Ok(_) => return Ok(ConfirmationOutcome::TimedOut),
                    // A decision landed first; the next pass reads it
                    Err(PendingUploadError::NotFound(_)) => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            tokio::select! {
                _ = notify.notified() => {}
                _ = sleep(self.config.poll_interval()) => {}
                _ = sleep_until(deadline) => {}
            }
        }
    }

    /// Whether the job store shows the job as terminal or gone.
    fn job_finished_elsewhere(&self, job_id: &str) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        match jobs.get(job_id) {
            Ok(Some(job)) => job.is_terminal(),
            Ok(None) => true,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to read job while parked");
                false
            }
        }
    }

    /// Approve an upload, optionally choosing a different image.
    ///
    /// Fails with `NotFound` unless the upload is still pending.
    pub fn confirm(
        &self,
        upload_id: &str,
        selected_image_index: Option<usize>,
    ) -> Result<PendingUpload, ConfirmationError> {
        let upload = self.store.resolve(
            upload_id,
            UploadResolution::Confirm {
                selected_image_index,
            },
        )?;
        info!(
            job_id = %upload.job_id,
            upload_id = %upload_id,
            selected_image_index = ?upload.selected_image_index,
            "Upload confirmed"
        );
        self.wake(upload_id);
        Ok(upload)
    }

    /// Reject an upload. Fails with `NotFound` unless it is still pending.
    pub fn cancel(&self, upload_id: &str) -> Result<PendingUpload, ConfirmationError> {
        let upload = self.store.resolve(upload_id, UploadResolution::Cancel)?;
        info!(job_id = %upload.job_id, upload_id = %upload_id, "Upload cancelled");
        self.wake(upload_id);
        Ok(upload)
    }

    pub fn get(&self, upload_id: &str) -> Result<Option<PendingUpload>, ConfirmationError> {
        Ok(self.store.get(upload_id)?)
    }

    /// The upload a job is currently parked on, if any.
    pub fn pending_for_job(&self, job_id: &str) -> Result<Option<PendingUpload>, ConfirmationError> {
        Ok(self.store.find_pending_for_job(job_id)?)
    }

    fn wake(&self, upload_id: &str) {
        if let Some(notify) = self.waiters().get(upload_id) {
            notify.notify_one();
        }
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<String, Arc<Notify>>> {
        self.waiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirmation::SqlitePendingUploadStore;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::Duration;

    fn create_gate(timeout_secs: u64, poll_interval_ms: u64) -> (Arc<ConfirmationGate>, Arc<dyn PendingUploadStore>) {
        let store: Arc<dyn PendingUploadStore> = Arc::new(SqlitePendingUploadStore::in_memory().unwrap());
        let config = ConfirmationConfig {
            enabled: true,
            timeout_secs,
            poll_interval_ms,
        };
        (Arc::new(ConfirmationGate::new(config, Arc::clone(&store))), store)
    }

    fn candidates(count: usize, best_index: usize) -> ImageCandidates {
        ImageCandidates {
            paths: (0..count).map(|i| PathBuf::from(format!("/tmp/frame_{}.jpg", i))).collect(),
            best_index,
        }
    }

    #[tokio::test]
    async fn test_local_confirm_wakes_waiter() {
        // Long poll interval: only the in-process signal can wake the waiter in time
        let (gate, store) = create_gate(60, 60_000);
        let upload = gate
            .open("job-1", json!({"name": "Pasta"}), &candidates(4, 1), vec![ExportTarget::Tandoor])
            .unwrap();
        assert_eq!(upload.selected_image_index, Some(1));

        let waiter = {
            let gate = Arc::clone(&gate);
            let upload = upload.clone();
            tokio::spawn(async move { gate.wait(&upload, &JobHandle::detached("job-1")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.confirm(&upload.id, Some(2)).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match outcome {
            ConfirmationOutcome::Confirmed(resolved) => {
                assert_eq!(resolved.selected_image(), Some("/tmp/frame_2.jpg"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(store.get(&upload.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_cancel_observed_by_polling() {
        let (gate, store) = create_gate(60, 20);
        let upload = gate
            .open("job-1", json!({"name": "Pasta"}), &candidates(2, 0), vec![ExportTarget::Mealie])
            .unwrap();

        // A second gate over the same store stands in for another process
        let other = ConfirmationGate::new(gate.config().clone(), Arc::clone(&store));

        let waiter = {
            let gate = Arc::clone(&gate);
            let upload = upload.clone();
            tokio::spawn(async move { gate.wait(&upload, &JobHandle::detached("job-1")).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        other.cancel(&upload.id).unwrap();

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_times_out_and_deletes_record() {
        let (gate, store) = create_gate(1, 50);
        let upload = gate
            .open("job-1", json!({"name": "Pasta"}), &ImageCandidates::empty(), vec![ExportTarget::Tandoor])
            .unwrap();
        assert_eq!(upload.best_image_index, None);

        let outcome = gate.wait(&upload, &JobHandle::detached("job-1")).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::TimedOut);
        assert!(store.get(&upload.id).unwrap().is_none());

        // Too late to confirm
        assert!(matches!(
            gate.confirm(&upload.id, None),
            Err(ConfirmationError::Store(PendingUploadError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_job_cancel_while_parked() {
        let (gate, store) = create_gate(60, 20);
        let upload = gate
            .open("job-1", json!({"name": "Pasta"}), &candidates(1, 0), vec![ExportTarget::Tandoor])
            .unwrap();
        let handle = JobHandle::detached("job-1");

        let waiter = {
            let gate = Arc::clone(&gate);
            let upload = upload.clone();
            let handle = handle.clone();
            tokio::spawn(async move { gate.wait(&upload, &handle).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.cancel();

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome, ConfirmationOutcome::JobCancelled);
        assert!(store.find_pending_for_job("job-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_job_finished_by_another_process_while_parked() {
        use crate::job::{JobStatus, SqliteJobStore};

        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
        let store: Arc<dyn PendingUploadStore> = Arc::new(SqlitePendingUploadStore::in_memory().unwrap());
        let config = ConfirmationConfig {
            enabled: true,
            timeout_secs: 60,
            poll_interval_ms: 20,
        };
        let gate = Arc::new(ConfirmationGate::new(config, Arc::clone(&store)).with_job_store(Arc::clone(&jobs)));

        let job = jobs.create("https://example.com/v/1").unwrap();
        let upload = gate
            .open(&job.id, json!({"name": "Pasta"}), &candidates(1, 0), vec![ExportTarget::Tandoor])
            .unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            let upload = upload.clone();
            let handle = JobHandle::detached(job.id.clone());
            tokio::spawn(async move { gate.wait(&upload, &handle).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        // No local flag is raised; only the store shows the cancellation
        jobs.finish(&job.id, JobStatus::Cancelled, "Cancelled by user", None).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .expect("waiter kept its slot after the job was cancelled")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::JobCancelled);
        assert!(store.get(&upload.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_confirm_not_found() {
        let (gate, _) = create_gate(60, 20);
        let upload = gate
            .open("job-1", json!({"name": "Pasta"}), &candidates(2, 0), vec![ExportTarget::Tandoor])
            .unwrap();

        gate.confirm(&upload.id, None).unwrap();
        assert!(matches!(
            gate.confirm(&upload.id, None),
            Err(ConfirmationError::Store(PendingUploadError::NotFound(_)))
        ));
        assert!(matches!(
            gate.cancel(&upload.id),
            Err(ConfirmationError::Store(PendingUploadError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_confirm_before_wait_is_not_lost() {
        let (gate, _) = create_gate(60, 60_000);
        let upload = gate
            .open("job-1", json!({"name": "Pasta"}), &candidates(2, 0), vec![ExportTarget::Tandoor])
            .unwrap();

        gate.confirm(&upload.id, None).unwrap();
        let outcome = gate.wait(&upload, &JobHandle::detached("job-1")).await.unwrap();
        assert!(matches!(outcome, ConfirmationOutcome::Confirmed(_)));
    }
}
