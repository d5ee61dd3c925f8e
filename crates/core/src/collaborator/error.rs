//! Error types for external collaborators.

use thiserror::Error;

/// Errors raised by the services the pipeline calls out to.
///
/// Each variant carries the collaborator's own message verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Video metadata or media could not be fetched.
    #[error("acquisition error: {0}")]
    Acquisition(String),

    /// Speech-to-text failed.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// On-screen text extraction failed.
    #[error("visual text error: {0}")]
    VisualText(String),

    /// Dish image candidate extraction failed.
    #[error("image extraction error: {0}")]
    ImageExtraction(String),

    /// The language model did not produce a usable recipe.
    #[error("generation error: {0}")]
    Generation(String),

    /// A recipe manager rejected the upload.
    #[error("export error: {0}")]
    Export(String),
}

impl CollaboratorError {
    /// The collaborator's message without the variant prefix.
    pub fn detail(&self) -> &str {
        match self {
            CollaboratorError::Acquisition(msg)
            | CollaboratorError::Transcription(msg)
            | CollaboratorError::VisualText(msg)
            | CollaboratorError::ImageExtraction(msg)
            | CollaboratorError::Generation(msg)
            | CollaboratorError::Export(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_strips_prefix() {
        let err = CollaboratorError::Acquisition("HTTP Error 404: Not Found".to_string());
        assert_eq!(err.to_string(), "acquisition error: HTTP Error 404: Not Found");
        assert_eq!(err.detail(), "HTTP Error 404: Not Found");
    }
}
