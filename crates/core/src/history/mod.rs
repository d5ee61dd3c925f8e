//! History store: one immutable entry per finished job.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteHistoryStore;
pub use store::{HistoryError, HistoryFilter, HistoryStore};
pub use types::{HistoryEntry, HistoryStatus, NewHistoryEntry};
