//! Runtime settings values.

use serde::{Deserialize, Serialize};

use crate::collaborator::ExportTarget;

/// Settings read by each job when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Park generated recipes for a human decision before uploading.
    pub confirm_before_upload: bool,
    /// Language hint for transcription and on-screen text.
    pub language: String,
    /// Upload targets, in the order they are tried.
    pub output_targets: Vec<ExportTarget>,
}

/// A partial update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_before_upload: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_targets: Option<Vec<ExportTarget>>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.confirm_before_upload.is_none()
            && self.language.is_none()
            && self.output_targets.is_none()
    }
}

/// Keys of the persisted settings rows.
pub(crate) mod keys {
    pub const CONFIRM_BEFORE_UPLOAD: &str = "confirm_before_upload";
    pub const LANGUAGE: &str = "language";
    pub const OUTPUT_TARGETS: &str = "output_targets";
}
