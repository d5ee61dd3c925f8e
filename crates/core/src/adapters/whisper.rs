//! Transcriber backed by the openai-whisper command-line tool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::process::run_tool;
use crate::collaborator::{CollaboratorError, Transcriber};
use crate::config::TranscriberConfig;

/// Runs `whisper` on the downloaded video and reads back its txt output.
pub struct WhisperTranscriber {
    config: TranscriberConfig,
}

impl WhisperTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    fn output_dir(video: &Path) -> PathBuf {
        video
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("transcripts")
    }

    fn args(&self, video: &Path, language: &str, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            video.into(),
            "--model".into(),
            self.config.model.clone().into(),
            "--output_format".into(),
            "txt".into(),
            "--output_dir".into(),
            output_dir.into(),
            "--fp16".into(),
            "False".into(),
        ];
        if !language.is_empty() {
            args.push("--language".into());
            args.push(language.into());
        }
        args
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, path: &Path, language: &str) -> Result<String, CollaboratorError> {
        let output_dir = Self::output_dir(path);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| CollaboratorError::Transcription(format!("cannot create output dir: {}", e)))?;

        run_tool(
            &self.config.whisper_path,
            self.args(path, language, &output_dir),
            self.config.timeout_secs,
        )
        .await
        .map_err(CollaboratorError::Transcription)?;

        let stem = path
            .file_stem()
            .ok_or_else(|| CollaboratorError::Transcription(format!("not a file: {}", path.display())))?;
        let transcript_path = output_dir.join(format!("{}.txt", stem.to_string_lossy()));

        let text = tokio::fs::read_to_string(&transcript_path).await.map_err(|e| {
            CollaboratorError::Transcription(format!(
                "cannot read {}: {}",
                transcript_path.display(),
                e
            ))
        })?;
        Ok(text.trim().to_string())
    }
}
