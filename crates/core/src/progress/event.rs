//! Events pushed to progress subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborator::{ExportTarget, RecipePayload};
use crate::confirmation::PendingUpload;
use crate::job::{Job, JobStatus};

/// A job lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was submitted.
    Created { job_id: String, url: String },
    /// A running job moved to a new stage or percent.
    Progress {
        job_id: String,
        status: JobStatus,
        stage: String,
        message: String,
        /// Stored percent, never lower than a previous event for this job.
        percent: u8,
        video_title: Option<String>,
    },
    /// A recipe is parked at the confirmation gate.
    Preview {
        job_id: String,
        upload_id: String,
        recipe: RecipePayload,
        image_candidates: Vec<String>,
        selected_image_index: Option<usize>,
        targets: Vec<ExportTarget>,
        expires_at: DateTime<Utc>,
    },
    Completed {
        job_id: String,
        recipe_name: Option<String>,
        recipe: RecipePayload,
        uploaded_to: Vec<String>,
        /// Targets that rejected the upload (partial success).
        failed_targets: Vec<String>,
    },
    Failed { job_id: String, error: String },
    Cancelled { job_id: String, reason: String },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Created { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Preview { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id, .. } => job_id,
        }
    }

    /// The serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Created { .. } => "created",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Preview { .. } => "preview",
            JobEvent::Completed { .. } => "completed",
            JobEvent::Failed { .. } => "failed",
            JobEvent::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this is the last event a job will produce.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobEvent::Completed { .. } | JobEvent::Failed { .. } | JobEvent::Cancelled { .. }
        )
    }

    pub(crate) fn progress(job: &Job) -> Self {
        JobEvent::Progress {
            job_id: job.id.clone(),
            status: job.status,
            stage: job.stage.clone(),
            message: job.message.clone(),
            percent: job.progress,
            video_title: job.video_title.clone(),
        }
    }

    pub(crate) fn preview(upload: &PendingUpload) -> Self {
        JobEvent::Preview {
            job_id: upload.job_id.clone(),
            upload_id: upload.id.clone(),
            recipe: upload.recipe.clone(),
            image_candidates: upload.image_candidates.clone(),
            selected_image_index: upload.selected_image_index,
            targets: upload.targets.clone(),
            expires_at: upload.expires_at,
        }
    }
}
