//! Settings an operator can change while the server runs.

mod service;
mod sqlite_store;
mod store;
mod types;

pub use service::SettingsService;
pub use sqlite_store::SqliteSettingsStore;
pub use store::{SettingsError, SettingsStore};
pub use types::{RuntimeSettings, SettingsPatch};
