//! Contracts for the services the extraction pipeline depends on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{CollaboratorError, ExportTarget, FetchedMedia, ImageCandidates, RecipePayload};

/// Downloads a video and its metadata.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, CollaboratorError>;
}

/// Speech-to-text over a downloaded video.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path, language: &str) -> Result<String, CollaboratorError>;
}

/// Reads text shown on screen (ingredient lists, captions).
///
/// Best-effort: the pipeline treats failure as "no visual text".
#[async_trait]
pub trait VisualTextExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path, language: &str) -> Result<String, CollaboratorError>;
}

/// Picks frames that could serve as the dish photo.
///
/// Best-effort: failure yields no candidates.
#[async_trait]
pub trait ImageExtractor: Send + Sync {
    async fn extract_candidates(&self, path: &Path) -> Result<ImageCandidates, CollaboratorError>;
}

/// Chooses the frame that best shows the finished dish.
#[async_trait]
pub trait ImageSelector: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &'static str;

    /// Index into `frames`, or `None` when the answer was not a usable index.
    async fn select(&self, frames: &[PathBuf]) -> Result<Option<usize>, CollaboratorError>;
}

/// Turns a video description and transcript into a recipe.
#[async_trait]
pub trait RecipeGenerator: Send + Sync {
    async fn generate(
        &self,
        source_url: &str,
        description: &str,
        transcript: &str,
    ) -> Result<RecipePayload, CollaboratorError>;
}

/// Uploads a recipe to one recipe manager.
#[async_trait]
pub trait RecipeExporter: Send + Sync {
    /// The recipe manager this exporter talks to.
    fn target(&self) -> ExportTarget;

    /// Create the recipe and attach the image. Returns the external recipe id.
    async fn export(
        &self,
        recipe: &RecipePayload,
        image: Option<&Path>,
    ) -> Result<String, CollaboratorError>;
}
