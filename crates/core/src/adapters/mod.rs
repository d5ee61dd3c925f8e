//! Concrete collaborators backed by external tools and HTTP APIs.
//!
//! yt-dlp, whisper and ffmpeg run as child processes; the language models and
//! the recipe managers are reached over HTTP.

mod ffmpeg_images;
mod mealie;
mod openai;
mod process;
mod recipe_api;
mod tandoor;
mod vision;
mod whisper;
mod yt_dlp;

pub use ffmpeg_images::{frame_times, FfmpegImageExtractor};
pub use mealie::{mealie_patch, MealieExporter};
pub use openai::{apply_estimate, parse_recipe, OpenAiRecipeGenerator};
pub use tandoor::{tandoor_payload, TandoorExporter};
pub use vision::{
    build_image_selector, parse_selection, selection_prompt, GeminiImageSelector,
    OpenAiImageSelector,
};
pub use whisper::WhisperTranscriber;
pub use yt_dlp::YtDlpFetcher;

use std::sync::Arc;

use crate::collaborator::{ExportTarget, RecipeExporter};
use crate::config::{ConfigError, ExportConfig};

/// Factory function to create one exporter per configured target.
pub fn build_exporters(config: &ExportConfig) -> Result<Vec<Arc<dyn RecipeExporter>>, ConfigError> {
    config
        .targets
        .iter()
        .map(|&target| {
            let section = config.target_config(target).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "export target '{}' has no [export.{}] section",
                    target, target
                ))
            })?;
            let exporter: Arc<dyn RecipeExporter> = match target {
                ExportTarget::Tandoor => Arc::new(TandoorExporter::new(section)),
                ExportTarget::Mealie => Arc::new(MealieExporter::new(section)),
            };
            Ok(exporter)
        })
        .collect()
}
