//! Confirmation gate: human approval before a recipe is uploaded.
//!
//! Pending uploads are persisted so that a decision made through any process
//! sharing the database reaches the pipeline waiting on it.

mod config;
mod gate;
mod sqlite_store;
mod store;
mod types;

pub use config::ConfirmationConfig;
pub use gate::{ConfirmationError, ConfirmationGate, ConfirmationOutcome};
pub use sqlite_store::SqlitePendingUploadStore;
pub use store::{PendingUploadError, PendingUploadStore};
pub use types::{NewPendingUpload, PendingUpload, UploadResolution, UploadStatus};
