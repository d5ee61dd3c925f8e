//! SQLite-backed settings store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection};

use super::{SettingsError, SettingsStore};

/// SQLite-backed settings store.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

impl SqliteSettingsStore {
    pub fn new(path: &Path) -> Result<Self, SettingsError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, SettingsError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SettingsError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, SettingsError> {
        self.conn
            .lock()
            .map_err(|_| SettingsError::Database("connection lock poisoned".to_string()))
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn all(&self) -> Result<Vec<(String, String)>, SettingsError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_many(&self, values: &[(&str, String)]) -> Result<(), SettingsError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for (key, value) in values {
            tx.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SettingsError> {
        self.conn()?.execute("DELETE FROM settings", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_many_upserts() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert!(store.all().unwrap().is_empty());

        store
            .set_many(&[("language", "\"en\"".to_string()), ("confirm_before_upload", "true".to_string())])
            .unwrap();
        store.set_many(&[("language", "\"fr\"".to_string())]).unwrap();

        assert_eq!(
            store.all().unwrap(),
            vec![
                ("confirm_before_upload".to_string(), "true".to_string()),
                ("language".to_string(), "\"fr\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_clear() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        store.set_many(&[("language", "\"en\"".to_string())]).unwrap();
        store.clear().unwrap();
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");

        SqliteSettingsStore::new(&path)
            .unwrap()
            .set_many(&[("language", "\"en\"".to_string())])
            .unwrap();

        let reopened = SqliteSettingsStore::new(&path).unwrap();
        assert_eq!(reopened.all().unwrap().len(), 1);
    }
}
