//! Settings storage trait.

use thiserror::Error;

/// Error type for settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Rejected update.
    #[error("Invalid setting: {0}")]
    Invalid(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for SettingsError {
    fn from(e: rusqlite::Error) -> Self {
        SettingsError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Database(e.to_string())
    }
}

/// Persisted key/value overrides of the file configuration.
///
/// Values are JSON text. Keys without a row fall back to the configured
/// default.
pub trait SettingsStore: Send + Sync {
    /// All stored rows.
    fn all(&self) -> Result<Vec<(String, String)>, SettingsError>;

    /// Upsert several rows in one transaction.
    fn set_many(&self, values: &[(&str, String)]) -> Result<(), SettingsError>;

    /// Remove every row.
    fn clear(&self) -> Result<(), SettingsError>;
}
