//! Pending upload storage trait.

use thiserror::Error;

use super::{NewPendingUpload, PendingUpload, UploadResolution};

/// Error type for pending upload operations.
#[derive(Debug, Error)]
pub enum PendingUploadError {
    /// No pending upload with this id (never existed, or already resolved).
    #[error("Pending upload not found or already resolved: {0}")]
    NotFound(String),

    /// The job already has a live pending upload.
    #[error("Job {0} already has a pending upload")]
    AlreadyPending(String),

    /// Selected image index is out of range.
    #[error("Image index {index} out of range ({available} candidates)")]
    InvalidImageIndex { index: usize, available: usize },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for PendingUploadError {
    fn from(e: rusqlite::Error) -> Self {
        PendingUploadError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for PendingUploadError {
    fn from(e: serde_json::Error) -> Self {
        PendingUploadError::Database(e.to_string())
    }
}

/// Durable record of uploads awaiting human approval.
///
/// Shared across processes: a confirmation may be written by a different
/// process than the one whose pipeline is waiting on it.
pub trait PendingUploadStore: Send + Sync {
    /// Create a pending upload. At most one live upload may exist per job.
    fn create(&self, upload: NewPendingUpload) -> Result<PendingUpload, PendingUploadError>;

    /// Get an upload by id, in any status.
    fn get(&self, id: &str) -> Result<Option<PendingUpload>, PendingUploadError>;

    /// The live upload for a job, if any.
    fn find_pending_for_job(&self, job_id: &str)
        -> Result<Option<PendingUpload>, PendingUploadError>;

    /// Atomically move an upload out of `pending`.
    ///
    /// Exactly one caller wins; everyone else gets `NotFound`.
    fn resolve(
        &self,
        id: &str,
        resolution: UploadResolution,
    ) -> Result<PendingUpload, PendingUploadError>;

    /// Delete an upload record. Returns whether it existed.
    fn delete(&self, id: &str) -> Result<bool, PendingUploadError>;

    /// All uploads still awaiting a decision.
    fn list_pending(&self) -> Result<Vec<PendingUpload>, PendingUploadError>;

    /// Uploads already resolved whose record was never deleted.
    fn list_resolved(&self) -> Result<Vec<PendingUpload>, PendingUploadError>;
}
