//! History domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Final outcome recorded for a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Success,
    Failed,
    Cancelled,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Success => "success",
            HistoryStatus::Failed => "failed",
            HistoryStatus::Cancelled => "cancelled",
        }
    }

    /// History status for a terminal job status.
    pub fn from_job_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Completed => Some(HistoryStatus::Success),
            JobStatus::Failed => Some(HistoryStatus::Failed),
            JobStatus::Cancelled => Some(HistoryStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(HistoryStatus::Success),
            "failed" => Ok(HistoryStatus::Failed),
            "cancelled" => Ok(HistoryStatus::Cancelled),
            other => Err(format!("unknown history status: {}", other)),
        }
    }
}

/// Immutable snapshot of a job at its terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub job_id: String,
    pub url: String,
    pub video_title: Option<String>,
    pub recipe_name: Option<String>,
    /// Full recipe payload; absent if the job ended before a recipe existed.
    pub recipe: Option<serde_json::Value>,
    /// Path of the dish image used for the upload.
    pub thumbnail: Option<String>,
    pub status: HistoryStatus,
    pub error_message: Option<String>,
    /// Upload targets that accepted the recipe.
    pub output_targets: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new history entry. `created_at` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub job_id: String,
    pub url: String,
    pub video_title: Option<String>,
    pub recipe: Option<serde_json::Value>,
    pub thumbnail: Option<String>,
    pub status: HistoryStatus,
    pub error_message: Option<String>,
    pub output_targets: Vec<String>,
}

impl NewHistoryEntry {
    /// Recipe name taken from the payload's `name` field.
    pub fn recipe_name(&self) -> Option<String> {
        self.recipe
            .as_ref()
            .and_then(|r| r.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string)
    }
}
