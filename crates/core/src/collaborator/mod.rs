//! External collaborators of the extraction pipeline.
//!
//! Only the contracts live here; concrete adapters are in [`crate::adapters`]
//! and test doubles in [`crate::testing`].

mod error;
mod traits;
mod types;

pub use error::CollaboratorError;
pub use traits::{
    ImageExtractor, ImageSelector, MediaFetcher, RecipeExporter, RecipeGenerator, Transcriber,
    VisualTextExtractor,
};
pub use types::{ExportTarget, FetchedMedia, ImageCandidates, RecipePayload};
