//! Extraction pipeline: the body the scheduler runs for each job.
//!
//! Stages, in order: fetch, transcribe, on-screen text, dish images, recipe
//! generation, optional confirmation, upload.

mod cache;
mod config;
mod error;
mod extraction;

pub use cache::{TextCache, TextKind};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use extraction::{combine_transcript, Collaborators, ExtractionPipeline};
