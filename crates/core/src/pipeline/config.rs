//! Extraction pipeline configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the extraction pipeline body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Language hint passed to transcription and on-screen text extraction.
    #[serde(default = "default_language")]
    pub language: String,

    /// Root of the per-media cache directories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_language() -> String {
    "he".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("tmp")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            work_dir: default_work_dir(),
        }
    }
}
