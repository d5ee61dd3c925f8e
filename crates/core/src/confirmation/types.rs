//! Pending upload types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborator::{ExportTarget, RecipePayload};

/// Resolution state of a pending upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Confirmed => "confirmed",
            UploadStatus::Cancelled => "cancelled",
            UploadStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "confirmed" => Ok(UploadStatus::Confirmed),
            "cancelled" => Ok(UploadStatus::Cancelled),
            "expired" => Ok(UploadStatus::Expired),
            other => Err(format!("unknown upload status: {}", other)),
        }
    }
}

/// A generated recipe waiting for a human to approve its upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub id: String,
    pub job_id: String,
    pub recipe: RecipePayload,
    /// Paths of every candidate dish image.
    pub image_candidates: Vec<String>,
    /// Index of the automatically selected candidate.
    pub best_image_index: Option<usize>,
    /// Index the upload will use. Starts at `best_image_index`.
    pub selected_image_index: Option<usize>,
    pub targets: Vec<ExportTarget>,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingUpload {
    /// Path of the image the upload will use.
    pub fn selected_image(&self) -> Option<&str> {
        self.selected_image_index
            .and_then(|idx| self.image_candidates.get(idx))
            .map(String::as_str)
    }

    pub fn is_pending(&self) -> bool {
        self.status == UploadStatus::Pending
    }
}

/// Fields for a new pending upload.
#[derive(Debug, Clone)]
pub struct NewPendingUpload {
    pub job_id: String,
    pub recipe: RecipePayload,
    pub image_candidates: Vec<String>,
    pub best_image_index: Option<usize>,
    pub targets: Vec<ExportTarget>,
    pub expires_at: DateTime<Utc>,
}

/// How a pending upload is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadResolution {
    /// Approve, optionally overriding the selected image.
    Confirm { selected_image_index: Option<usize> },
    Cancel,
    Expire,
}

impl UploadResolution {
    pub fn status(&self) -> UploadStatus {
        match self {
            UploadResolution::Confirm { .. } => UploadStatus::Confirmed,
            UploadResolution::Cancel => UploadStatus::Cancelled,
            UploadResolution::Expire => UploadStatus::Expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selected_image() {
        let upload = PendingUpload {
            id: "u1".to_string(),
            job_id: "j1".to_string(),
            recipe: json!({"name": "Pasta"}),
            image_candidates: vec!["a.jpg".to_string(), "b.jpg".to_string()],
            best_image_index: Some(0),
            selected_image_index: Some(1),
            targets: vec![ExportTarget::Mealie],
            status: UploadStatus::Pending,
            created_at: Utc::now(),
            expires_at: Utc::now(),
        };
        assert_eq!(upload.selected_image(), Some("b.jpg"));
    }
}
