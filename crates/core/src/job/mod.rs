//! Job store: durable record of every submitted extraction job.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobStore;
pub use store::{JobFilter, JobStore, JobStoreError, ProgressUpdate};
pub use types::{Job, JobStatus, Stage};
