//! Job storage trait and types.

use thiserror::Error;

use super::{Job, JobStatus, Stage};

/// Error type for job store operations.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for JobStoreError {
    fn from(e: rusqlite::Error) -> Self {
        JobStoreError::Database(e.to_string())
    }
}

/// A progress write for a running job.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub message: String,
    pub percent: u8,
    pub video_title: Option<String>,
}

impl ProgressUpdate {
    pub fn new(stage: Stage, message: impl Into<String>, percent: u8) -> Self {
        Self {
            stage,
            message: message.into(),
            percent,
            video_title: None,
        }
    }

    pub fn with_video_title(mut self, title: impl Into<String>) -> Self {
        self.video_title = Some(title.into());
        self
    }
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,
    /// Only non-terminal jobs.
    pub active_only: bool,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            active_only: false,
            limit: 100,
            offset: 0,
        }
    }

    /// Filter by status.
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to jobs that have not reached a terminal status.
    pub fn active(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable record of job identity, status and progress.
///
/// Every mutation is a single atomic update by id. Updates that would move a
/// terminal job are refused and reported through the returned `bool` / `None`
/// rather than as errors, since losing that race is expected.
pub trait JobStore: Send + Sync {
    /// Create a new job in `pending`.
    fn create(&self, url: &str) -> Result<Job, JobStoreError>;

    /// Get a job by ID.
    fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError>;

    /// List jobs matching the filter, newest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobStoreError>;

    /// Count jobs matching the filter (ignores limit/offset).
    fn count(&self, filter: &JobFilter) -> Result<i64, JobStoreError>;

    /// Write progress for a non-terminal job.
    ///
    /// The stored percentage never decreases. Returns the updated job, or
    /// `None` if the job is already terminal.
    fn update_progress(
        &self,
        id: &str,
        update: &ProgressUpdate,
    ) -> Result<Option<Job>, JobStoreError>;

    /// Move a non-terminal job into a terminal status.
    ///
    /// Returns the updated job, or `None` if the job was already terminal.
    fn finish(
        &self,
        id: &str,
        status: JobStatus,
        message: &str,
        error_message: Option<&str>,
    ) -> Result<Option<Job>, JobStoreError>;

    /// All jobs that have not reached a terminal status, oldest first.
    fn list_active(&self) -> Result<Vec<Job>, JobStoreError>;

    /// Permanently delete a job record.
    fn delete(&self, id: &str) -> Result<Job, JobStoreError>;
}
