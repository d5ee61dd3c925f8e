//! Testing utilities and mock implementations of the pipeline collaborators.
//!
//! The mocks share their state behind `Arc`, so a clone handed to the
//! pipeline and the one kept by the test observe the same calls.
//!
//! # Example
//!
//! ```rust,ignore
//! use social_recipes_core::testing::MockCollaborators;
//!
//! let mocks = MockCollaborators::new();
//! mocks.transcriber.hold();
//! let pipeline = ExtractionPipeline::new(config, mocks.collaborators(), publisher, gate);
//! ```

mod mock_exporter;
mod mock_generator;
mod mock_media;

pub use mock_exporter::{MockExporter, RecordedExport};
pub use mock_generator::{MockRecipeGenerator, RecordedGeneration};
pub use mock_media::{MockFetcher, MockImageExtractor, MockTranscriber, MockVisualText};

use std::sync::Arc;

use crate::collaborator::{ExportTarget, RecipeExporter};
use crate::pipeline::Collaborators;

/// One mock per collaborator, with a single Tandoor exporter.
#[derive(Debug, Clone)]
pub struct MockCollaborators {
    pub fetcher: MockFetcher,
    pub transcriber: MockTranscriber,
    pub visual_text: MockVisualText,
    pub images: MockImageExtractor,
    pub generator: MockRecipeGenerator,
    pub exporters: Vec<MockExporter>,
}

impl Default for MockCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCollaborators {
    pub fn new() -> Self {
        Self::with_targets(&[ExportTarget::Tandoor])
    }

    pub fn with_targets(targets: &[ExportTarget]) -> Self {
        Self {
            fetcher: MockFetcher::new(),
            transcriber: MockTranscriber::new(),
            visual_text: MockVisualText::new(),
            images: MockImageExtractor::new(),
            generator: MockRecipeGenerator::new(),
            exporters: targets.iter().map(|&t| MockExporter::new(t)).collect(),
        }
    }

    /// The first exporter.
    pub fn exporter(&self) -> &MockExporter {
        &self.exporters[0]
    }

    /// Total export calls across all exporters.
    pub async fn export_count(&self) -> usize {
        let mut total = 0;
        for exporter in &self.exporters {
            total += exporter.export_count().await;
        }
        total
    }

    /// Pipeline collaborators backed by these mocks.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            fetcher: Arc::new(self.fetcher.clone()),
            transcriber: Arc::new(self.transcriber.clone()),
            visual_text: Some(Arc::new(self.visual_text.clone())),
            images: Arc::new(self.images.clone()),
            generator: Arc::new(self.generator.clone()),
            exporters: self
                .exporters
                .iter()
                .map(|e| Arc::new(e.clone()) as Arc<dyn RecipeExporter>)
                .collect(),
        }
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use serde_json::json;

    use crate::collaborator::{FetchedMedia, ImageCandidates, RecipePayload};

    /// A schema.org recipe with a couple of ingredients and steps.
    pub fn recipe(name: &str) -> RecipePayload {
        json!({
            "@type": "Recipe",
            "name": name,
            "description": format!("{} from a cooking video", name),
            "recipeYield": "2 servings",
            "prepTime": "PT10M",
            "cookTime": "PT20M",
            "recipeIngredient": ["4 eggs", "1 can crushed tomatoes", "1 onion"],
            "recipeInstructions": [
                {"@type": "HowToStep", "text": "Fry the onion"},
                {"@type": "HowToStep", "text": "Add tomatoes and simmer"},
                {"@type": "HowToStep", "text": "Crack in the eggs and cover"}
            ],
            "keywords": "breakfast, eggs"
        })
    }

    /// Downloaded media with the given platform id.
    pub fn fetched_media(media_id: &str) -> FetchedMedia {
        FetchedMedia {
            media_id: media_id.to_string(),
            path: PathBuf::from(format!("/tmp/mock-downloads/{}.mp4", media_id)),
            title: format!("Cooking video {}", media_id),
            description: "Easy recipe #food #cooking".to_string(),
        }
    }

    /// `count` frame paths with the middle one selected.
    pub fn image_candidates(count: usize) -> ImageCandidates {
        ImageCandidates {
            paths: (0..count)
                .map(|i| PathBuf::from(format!("/tmp/mock-frames/frame_{:02}.jpg", i)))
                .collect(),
            best_index: count / 2,
        }
    }
}
