//! Startup reconciliation of state left behind by a previous process.
//!
//! Permits, cancellation flags and confirmation waiters only live in memory,
//! so a job caught mid-pipeline by a restart cannot be resumed. The sweep
//! fails those jobs (which records their history) and removes upload
//! records nobody is waiting on anymore, pending or already resolved. Jobs still in `pending` never
//! started and are left alone.
//!
//! The sweep cannot tell a crashed run from one still progressing in another
//! live process, so it must only run while no other process is serving jobs.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collaborator::RecipePayload;
use crate::confirmation::{PendingUploadError, PendingUploadStore};
use crate::job::{JobStatus, JobStoreError};
use crate::metrics;
use crate::pipeline::PipelineError;
use crate::progress::{ProgressPublisher, PublishError};

/// Errors from the recovery sweep.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("job store error: {0}")]
    JobStore(#[from] JobStoreError),

    #[error("publisher error: {0}")]
    Publish(#[from] PublishError),

    #[error("pending upload store error: {0}")]
    PendingUpload(#[from] PendingUploadError),
}

/// What the sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Jobs marked failed because they were mid-pipeline.
    pub failed_jobs: Vec<String>,
    /// Jobs left in `pending`.
    pub pending_jobs: Vec<String>,
    /// Pending uploads deleted.
    pub removed_uploads: Vec<String>,
}

/// Run the sweep. Call once at startup, before the scheduler admits jobs.
pub fn run_recovery_sweep(
    publisher: &ProgressPublisher,
    uploads: &dyn PendingUploadStore,
) -> Result<RecoveryReport, RecoveryError> {
    let mut report = RecoveryReport::default();

    // Recipes of parked jobs go into their history entries
    let mut parked: HashMap<String, RecipePayload> = HashMap::new();
    for upload in uploads.list_pending()? {
        if uploads.delete(&upload.id)? {
            warn!(job_id = %upload.job_id, upload_id = %upload.id, "Removed orphaned pending upload");
            report.removed_uploads.push(upload.id.clone());
        }
        parked.insert(upload.job_id, upload.recipe);
    }

    let message = PipelineError::Interrupted.to_string();
    for job in publisher.jobs().list_active()? {
        if job.status == JobStatus::Pending {
            report.pending_jobs.push(job.id);
            continue;
        }

        let recipe = parked.remove(&job.id);
        if publisher.fail_job(&job.id, &message, recipe)? {
            warn!(job_id = %job.id, status = %job.status, "Failed job interrupted by restart");
            report.failed_jobs.push(job.id);
        }
    }

    // Resolved by a process that died before deleting the record
    for upload in uploads.list_resolved()? {
        let job_done = match publisher.jobs().get(&upload.job_id)? {
            Some(job) => job.is_terminal(),
            None => true,
        };
        if job_done && uploads.delete(&upload.id)? {
            debug!(
                job_id = %upload.job_id,
                upload_id = %upload.id,
                status = upload.status.as_str(),
                "Removed stale resolved upload"
            );
            report.removed_uploads.push(upload.id);
        }
    }

    metrics::RECOVERED_JOBS.inc_by(report.failed_jobs.len() as u64);
    metrics::RECOVERED_UPLOADS.inc_by(report.removed_uploads.len() as u64);

    info!(
        failed = report.failed_jobs.len(),
        pending = report.pending_jobs.len(),
        removed_uploads = report.removed_uploads.len(),
        "Recovery sweep complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::ExportTarget;
    use crate::confirmation::{NewPendingUpload, SqlitePendingUploadStore, UploadResolution};
    use crate::history::{HistoryStatus, HistoryStore, SqliteHistoryStore};
    use crate::job::{JobStore, ProgressUpdate, SqliteJobStore, Stage};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_sweep_fails_running_jobs_only() {
        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
        let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let uploads = SqlitePendingUploadStore::in_memory().unwrap();
        let publisher = ProgressPublisher::new(Arc::clone(&jobs), Arc::clone(&history));

        let pending = jobs.create("https://example.com/v/1").unwrap();
        let transcribing = jobs.create("https://example.com/v/2").unwrap();
        let parked = jobs.create("https://example.com/v/3").unwrap();
        let done = jobs.create("https://example.com/v/4").unwrap();

        jobs.update_progress(&transcribing.id, &ProgressUpdate::new(Stage::Transcribe, "Transcribing audio...", 35))
            .unwrap();
        jobs.update_progress(&parked.id, &ProgressUpdate::new(Stage::Preview, "Waiting for your confirmation...", 90))
            .unwrap();
        jobs.finish(&done.id, JobStatus::Completed, "Recipe uploaded", None).unwrap();

        let upload = uploads
            .create(NewPendingUpload {
                job_id: parked.id.clone(),
                recipe: json!({"name": "Hummus"}),
                image_candidates: vec![],
                best_image_index: None,
                targets: vec![ExportTarget::Tandoor],
                expires_at: Utc::now(),
            })
            .unwrap();

        let report = run_recovery_sweep(&publisher, &uploads).unwrap();

        assert_eq!(report.pending_jobs, vec![pending.id.clone()]);
        assert_eq!(report.failed_jobs.len(), 2);
        assert!(report.failed_jobs.contains(&transcribing.id));
        assert!(report.failed_jobs.contains(&parked.id));
        assert_eq!(report.removed_uploads, vec![upload.id.clone()]);

        assert_eq!(jobs.get(&pending.id).unwrap().unwrap().status, JobStatus::Pending);
        assert_eq!(jobs.get(&done.id).unwrap().unwrap().status, JobStatus::Completed);

        let failed = jobs.get(&transcribing.id).unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("Server was restarted during processing. Please retry.")
        );

        let entry = history.get(&parked.id).unwrap().unwrap();
        assert_eq!(entry.status, HistoryStatus::Failed);
        assert_eq!(entry.recipe_name.as_deref(), Some("Hummus"));
        assert!(uploads.get(&upload.id).unwrap().is_none());
    }

    #[test]
    fn test_sweep_removes_resolved_leftovers() {
        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
        let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let uploads = SqlitePendingUploadStore::in_memory().unwrap();
        let publisher = ProgressPublisher::new(Arc::clone(&jobs), Arc::clone(&history));

        let new_upload = |job_id: &str| NewPendingUpload {
            job_id: job_id.to_string(),
            recipe: json!({"name": "Dal"}),
            image_candidates: vec![],
            best_image_index: None,
            targets: vec![ExportTarget::Tandoor],
            expires_at: Utc::now(),
        };

        // Confirmed, then the process died before deleting the record
        let done = jobs.create("https://example.com/v/1").unwrap();
        let confirmed = uploads.create(new_upload(&done.id)).unwrap();
        uploads
            .resolve(&confirmed.id, UploadResolution::Confirm { selected_image_index: None })
            .unwrap();
        jobs.finish(&done.id, JobStatus::Completed, "Recipe uploaded to tandoor", None)
            .unwrap();

        // Job record already gone
        let orphan = uploads.create(new_upload("deleted-job")).unwrap();
        uploads.resolve(&orphan.id, UploadResolution::Expire).unwrap();

        let report = run_recovery_sweep(&publisher, &uploads).unwrap();

        assert_eq!(report.removed_uploads.len(), 2);
        assert!(report.removed_uploads.contains(&confirmed.id));
        assert!(report.removed_uploads.contains(&orphan.id));
        assert!(uploads.list_resolved().unwrap().is_empty());
        assert!(report.failed_jobs.is_empty());
    }

    #[test]
    fn test_sweep_on_clean_store() {
        let jobs: Arc<dyn JobStore> = Arc::new(SqliteJobStore::in_memory().unwrap());
        let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let uploads = SqlitePendingUploadStore::in_memory().unwrap();
        let publisher = ProgressPublisher::new(jobs, history);

        let report = run_recovery_sweep(&publisher, &uploads).unwrap();
        assert_eq!(report, RecoveryReport::default());
    }
}
