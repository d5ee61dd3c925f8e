//! Pipeline error types.

use thiserror::Error;

/// Why a pipeline run did not complete.
///
/// The display string is what lands in the job's `error_message`. The short
/// description always comes first so clients can match on it; collaborator
/// text follows the colon.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Video download failed: {0}")]
    Acquisition(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Recipe generation failed: {0}")]
    Generation(String),

    #[error("Upload failed for all targets: {0}")]
    Export(String),

    #[error("Upload confirmation timed out")]
    ConfirmationTimedOut,

    #[error("Upload cancelled by user")]
    UploadCancelled,

    #[error("Server was restarted during processing. Please retry.")]
    Interrupted,

    #[error("Pipeline crashed unexpectedly")]
    Crashed,

    /// The job was cancelled or finished elsewhere. Nothing to record.
    #[error("Job was cancelled")]
    Cancelled,

    /// Store or publisher failure inside the engine.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the engine itself produced this error, as opposed to an
    /// external collaborator.
    pub fn is_orchestration(&self) -> bool {
        matches!(
            self,
            PipelineError::ConfirmationTimedOut
                | PipelineError::Interrupted
                | PipelineError::Crashed
                | PipelineError::Internal(_)
        )
    }
}

impl From<crate::scheduler::Cancelled> for PipelineError {
    fn from(_: crate::scheduler::Cancelled) -> Self {
        PipelineError::Cancelled
    }
}
