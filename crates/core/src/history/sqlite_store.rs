//! SQLite-backed history store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{HistoryEntry, HistoryError, HistoryFilter, HistoryStatus, HistoryStore, NewHistoryEntry};

const HISTORY_COLUMNS: &str = "job_id, url, video_title, recipe_name, recipe_data, thumbnail, \
     status, error_message, output_targets, created_at";

/// SQLite-backed history store.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn new(path: &Path) -> Result<Self, HistoryError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), HistoryError> {
        // job_id is the key: one entry per job, ever
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                job_id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                video_title TEXT,
                recipe_name TEXT,
                recipe_data TEXT,
                thumbnail TEXT,
                status TEXT NOT NULL,
                error_message TEXT,
                output_targets TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_created_at ON history(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_history_status ON history(status);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        self.conn
            .lock()
            .map_err(|_| HistoryError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &HistoryFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        match filter.status {
            Some(status) => (
                "WHERE status = ?".to_string(),
                vec![Box::new(status.as_str()) as Box<dyn rusqlite::ToSql>],
            ),
            None => (String::new(), Vec::new()),
        }
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<HistoryEntry> {
        let recipe_json: Option<String> = row.get(4)?;
        let status_str: String = row.get(6)?;
        let targets_json: String = row.get(8)?;
        let created_at_str: String = row.get(9)?;

        Ok(HistoryEntry {
            job_id: row.get(0)?,
            url: row.get(1)?,
            video_title: row.get(2)?,
            recipe_name: row.get(3)?,
            recipe: recipe_json.and_then(|json| serde_json::from_str(&json).ok()),
            thumbnail: row.get(5)?,
            status: status_str.parse().unwrap_or(HistoryStatus::Failed),
            error_message: row.get(7)?,
            output_targets: serde_json::from_str(&targets_json).unwrap_or_default(),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }

    fn fetch(conn: &Connection, job_id: &str) -> Result<Option<HistoryEntry>, HistoryError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM history WHERE job_id = ?", HISTORY_COLUMNS),
            params![job_id],
            Self::row_to_entry,
        );

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn record(&self, entry: NewHistoryEntry) -> Result<bool, HistoryError> {
        let conn = self.conn()?;

        let recipe_name = entry.recipe_name();
        let recipe_json = entry.recipe.as_ref().map(serde_json::to_string).transpose()?;
        let targets_json = serde_json::to_string(&entry.output_targets)?;

        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO history ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                HISTORY_COLUMNS
            ),
            params![
                entry.job_id,
                entry.url,
                entry.video_title,
                recipe_name,
                recipe_json,
                entry.thumbnail,
                entry.status.as_str(),
                entry.error_message,
                targets_json,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(inserted == 1)
    }

    fn get(&self, job_id: &str) -> Result<Option<HistoryEntry>, HistoryError> {
        let conn = self.conn()?;
        Self::fetch(&conn, job_id)
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>, HistoryError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT {} FROM history {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            HISTORY_COLUMNS, where_clause
        );

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_entry)?;

        let mut entries = Vec::new();
        for row_result in rows {
            entries.push(row_result?);
        }
        Ok(entries)
    }

    fn count(&self, filter: &HistoryFilter) -> Result<i64, HistoryError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM history {}", where_clause),
            param_refs.as_slice(),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn delete(&self, job_id: &str) -> Result<HistoryEntry, HistoryError> {
        let conn = self.conn()?;

        let entry = Self::fetch(&conn, job_id)?
            .ok_or_else(|| HistoryError::NotFound(job_id.to_string()))?;
        conn.execute("DELETE FROM history WHERE job_id = ?", params![job_id])?;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteHistoryStore {
        SqliteHistoryStore::in_memory().unwrap()
    }

    fn success_entry(job_id: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            job_id: job_id.to_string(),
            url: "https://www.instagram.com/reel/abc".to_string(),
            video_title: Some("Best hummus".to_string()),
            recipe: Some(json!({
                "name": "Hummus",
                "recipeIngredient": ["chickpeas", "tahini"],
            })),
            thumbnail: Some("tmp/abc/frame_03.jpg".to_string()),
            status: HistoryStatus::Success,
            error_message: None,
            output_targets: vec!["tandoor".to_string()],
        }
    }

    fn failed_entry(job_id: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            job_id: job_id.to_string(),
            url: "https://www.instagram.com/reel/def".to_string(),
            video_title: None,
            recipe: None,
            thumbnail: None,
            status: HistoryStatus::Failed,
            error_message: Some("Video download failed: HTTP 404".to_string()),
            output_targets: vec![],
        }
    }

    #[test]
    fn test_record_and_get() {
        let store = create_test_store();
        assert!(store.record(success_entry("job-1")).unwrap());

        let entry = store.get("job-1").unwrap().unwrap();
        assert_eq!(entry.status, HistoryStatus::Success);
        assert_eq!(entry.recipe_name.as_deref(), Some("Hummus"));
        assert_eq!(entry.output_targets, vec!["tandoor".to_string()]);
        assert_eq!(entry.recipe.unwrap()["recipeIngredient"][1], "tahini");
    }

    #[test]
    fn test_record_is_insert_once() {
        let store = create_test_store();
        assert!(store.record(failed_entry("job-1")).unwrap());
        assert!(!store.record(success_entry("job-1")).unwrap());

        let entry = store.get("job-1").unwrap().unwrap();
        assert_eq!(entry.status, HistoryStatus::Failed);
        assert_eq!(store.count(&HistoryFilter::new()).unwrap(), 1);
    }

    #[test]
    fn test_failed_entry_has_no_recipe() {
        let store = create_test_store();
        store.record(failed_entry("job-2")).unwrap();

        let entry = store.get("job-2").unwrap().unwrap();
        assert!(entry.recipe.is_none());
        assert!(entry.recipe_name.is_none());
        assert_eq!(
            entry.error_message.as_deref(),
            Some("Video download failed: HTTP 404")
        );
    }

    #[test]
    fn test_list_with_status_filter() {
        let store = create_test_store();
        store.record(success_entry("a")).unwrap();
        store.record(failed_entry("b")).unwrap();
        store.record(failed_entry("c")).unwrap();

        let failed = store
            .list(&HistoryFilter::new().with_status(HistoryStatus::Failed))
            .unwrap();
        assert_eq!(failed.len(), 2);
        assert_eq!(
            store
                .count(&HistoryFilter::new().with_status(HistoryStatus::Success))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_list_pagination() {
        let store = create_test_store();
        for i in 0..5 {
            store.record(failed_entry(&format!("job-{}", i))).unwrap();
        }

        let page = store
            .list(&HistoryFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_delete() {
        let store = create_test_store();
        store.record(success_entry("job-1")).unwrap();

        let deleted = store.delete("job-1").unwrap();
        assert_eq!(deleted.job_id, "job-1");
        assert!(store.get("job-1").unwrap().is_none());
        assert!(matches!(store.delete("job-1"), Err(HistoryError::NotFound(_))));
    }
}
