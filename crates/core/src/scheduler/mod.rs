//! Job scheduler.
//!
//! Jobs are submitted into `pending`, then started with a pipeline body:
//! - **Admission**: a counting semaphore bounds running pipelines; the rest queue
//! - **Cancellation**: cooperative, through per-job flags polled by the body
//! - **Crash safety**: a panicking body still releases its permit and fails the job

mod config;
mod handle;
mod runner;
mod types;

pub use config::SchedulerConfig;
pub use handle::{Cancelled, JobHandle, PipelineBody};
pub use runner::{Scheduler, CANCELLED_BY_USER};
pub use types::{SchedulerError, SchedulerStatus};
