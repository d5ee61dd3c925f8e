//! Job domain types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted, waiting for a concurrency slot.
    Pending,
    Downloading,
    Transcribing,
    Extracting,
    Creating,
    /// Parked at the confirmation gate.
    AwaitingConfirmation,
    Uploading,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// All statuses, in pipeline order.
    pub const ALL: [JobStatus; 10] = [
        JobStatus::Pending,
        JobStatus::Downloading,
        JobStatus::Transcribing,
        JobStatus::Extracting,
        JobStatus::Creating,
        JobStatus::AwaitingConfirmation,
        JobStatus::Uploading,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Statuses a job can never leave.
    pub const TERMINAL: [JobStatus; 3] =
        [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Extracting => "extracting",
            JobStatus::Creating => "creating",
            JobStatus::AwaitingConfirmation => "awaiting_confirmation",
            JobStatus::Uploading => "uploading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Whether this status is final.
    pub fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(self)
    }

    /// Whether the pipeline body is (or was) actively working on the job.
    pub fn is_running(&self) -> bool {
        !self.is_terminal() && *self != JobStatus::Pending
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown job status: {}", s))
    }
}

/// Fine-grained pipeline stage reported with progress updates.
///
/// Several stages share one coarse [`JobStatus`]; see [`Stage::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    /// Fetching video metadata.
    Info,
    Download,
    Transcribe,
    /// On-screen text extraction.
    Visual,
    /// Dish image candidate extraction.
    Image,
    /// Recipe generation.
    Evaluate,
    /// Waiting for a human to approve the upload.
    Preview,
    Upload,
    Complete,
    Error,
    Cancelled,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Info => "info",
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Visual => "visual",
            Stage::Image => "image",
            Stage::Evaluate => "evaluate",
            Stage::Preview => "preview",
            Stage::Upload => "upload",
            Stage::Complete => "complete",
            Stage::Error => "error",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Coarse status a job is in while at this stage.
    pub fn status(&self) -> JobStatus {
        match self {
            Stage::Pending => JobStatus::Pending,
            Stage::Info | Stage::Download => JobStatus::Downloading,
            Stage::Transcribe => JobStatus::Transcribing,
            Stage::Visual | Stage::Image => JobStatus::Extracting,
            Stage::Evaluate => JobStatus::Creating,
            Stage::Preview => JobStatus::AwaitingConfirmation,
            Stage::Upload => JobStatus::Uploading,
            Stage::Complete => JobStatus::Completed,
            Stage::Error => JobStatus::Failed,
            Stage::Cancelled => JobStatus::Cancelled,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end-to-end extraction run for a submitted URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub url: String,
    pub status: JobStatus,
    /// Progress percentage (0-100).
    pub progress: u8,
    /// Name of the current stage (see [`Stage`]).
    pub stage: String,
    /// Human-readable message for the current stage.
    pub message: String,
    pub video_title: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_mapping() {
        assert_eq!(Stage::Info.status(), JobStatus::Downloading);
        assert_eq!(Stage::Download.status(), JobStatus::Downloading);
        assert_eq!(Stage::Visual.status(), JobStatus::Extracting);
        assert_eq!(Stage::Image.status(), JobStatus::Extracting);
        assert_eq!(Stage::Evaluate.status(), JobStatus::Creating);
        assert_eq!(Stage::Preview.status(), JobStatus::AwaitingConfirmation);
        assert_eq!(Stage::Error.status(), JobStatus::Failed);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::AwaitingConfirmation.is_terminal());
    }

    #[test]
    fn test_is_running() {
        assert!(!JobStatus::Pending.is_running());
        assert!(JobStatus::Transcribing.is_running());
        assert!(!JobStatus::Completed.is_running());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("processing".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::AwaitingConfirmation).unwrap();
        assert_eq!(json, "\"awaiting_confirmation\"");
    }
}
