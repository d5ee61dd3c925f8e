//! History storage trait and types.

use thiserror::Error;

use super::{HistoryEntry, HistoryStatus, NewHistoryEntry};

/// Error type for history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Entry not found.
    #[error("History entry not found: {0}")]
    NotFound(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        HistoryError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        HistoryError::Database(e.to_string())
    }
}

/// Filter for querying history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<HistoryStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: HistoryStatus) -> Self {
        self.status = Some(status);
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

/// Durable, append-only record of finished jobs.
pub trait HistoryStore: Send + Sync {
    /// Insert the entry for a job.
    ///
    /// Returns `false` without touching the store if the job already has one.
    fn record(&self, entry: NewHistoryEntry) -> Result<bool, HistoryError>;

    /// Get the entry for a job.
    fn get(&self, job_id: &str) -> Result<Option<HistoryEntry>, HistoryError>;

    /// List entries matching the filter, newest first.
    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, HistoryError>;

    /// Count entries matching the filter.
    fn count(&self, filter: &HistoryFilter) -> Result<i64, HistoryError>;

    /// Delete an entry. Only ever called on explicit user request.
    fn delete(&self, job_id: &str) -> Result<HistoryEntry, HistoryError>;
}
