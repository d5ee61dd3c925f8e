//! Progress publisher: write-through fan-out of job lifecycle events.

mod event;
mod publisher;

pub use event::JobEvent;
pub use publisher::{JobCompletion, ProgressPublisher, PublishError, DEFAULT_CHANNEL_CAPACITY};
