//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{Job, JobFilter, JobStatus, JobStore, JobStoreError, ProgressUpdate, Stage};

const JOB_COLUMNS: &str =
    "id, url, status, progress, stage, message, video_title, error_message, created_at, updated_at";

const NOT_TERMINAL: &str = "status NOT IN ('completed', 'failed', 'cancelled')";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobStoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                stage TEXT NOT NULL,
                message TEXT NOT NULL DEFAULT '',
                video_title TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobStoreError> {
        self.conn
            .lock()
            .map_err(|_| JobStoreError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?".to_string());
            params.push(Box::new(status.as_str()));
        }

        if filter.active_only {
            conditions.push(NOT_TERMINAL.to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let status_str: String = row.get(2)?;
        let progress: i64 = row.get(3)?;
        let created_at_str: String = row.get(8)?;
        let updated_at_str: String = row.get(9)?;

        // Unknown values can only come from a newer schema; treat them as failed
        let status = status_str.parse().unwrap_or(JobStatus::Failed);

        Ok(Job {
            id: row.get(0)?,
            url: row.get(1)?,
            status,
            progress: progress.clamp(0, 100) as u8,
            stage: row.get(4)?,
            message: row.get(5)?,
            video_title: row.get(6)?,
            error_message: row.get(7)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Job>, JobStoreError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Re-read a job after a conditional update that touched no rows.
    fn refused(conn: &Connection, id: &str) -> Result<Option<Job>, JobStoreError> {
        match Self::fetch(conn, id)? {
            Some(_) => Ok(None),
            None => Err(JobStoreError::NotFound(id.to_string())),
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn terminal_stage(status: JobStatus) -> Stage {
    match status {
        JobStatus::Completed => Stage::Complete,
        JobStatus::Cancelled => Stage::Cancelled,
        _ => Stage::Error,
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, url: &str) -> Result<Job, JobStoreError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let message = "Waiting to start...".to_string();

        conn.execute(
            "INSERT INTO jobs (id, url, status, progress, stage, message, created_at, updated_at) VALUES (?, ?, ?, 0, ?, ?, ?, ?)",
            params![
                id,
                url,
                JobStatus::Pending.as_str(),
                Stage::Pending.as_str(),
                message,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(Job {
            id,
            url: url.to_string(),
            status: JobStatus::Pending,
            progress: 0,
            stage: Stage::Pending.as_str().to_string(),
            message,
            video_title: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Job>, JobStoreError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobStoreError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY created_at DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_job)?;

        let mut jobs = Vec::new();
        for row_result in rows {
            jobs.push(row_result?);
        }

        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobStoreError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }

    fn update_progress(
        &self,
        id: &str,
        update: &ProgressUpdate,
    ) -> Result<Option<Job>, JobStoreError> {
        let conn = self.conn()?;
        let now = Utc::now();

        let changed = conn.execute(
            &format!(
                "UPDATE jobs SET status = ?, progress = MAX(progress, ?), stage = ?, message = ?, \
                 video_title = COALESCE(?, video_title), updated_at = ? WHERE id = ? AND {}",
                NOT_TERMINAL
            ),
            params![
                update.stage.status().as_str(),
                update.percent.min(100),
                update.stage.as_str(),
                update.message,
                update.video_title,
                now.to_rfc3339(),
                id,
            ],
        )?;

        if changed == 0 {
            return Self::refused(&conn, id);
        }

        Self::fetch(&conn, id)
    }

    fn finish(
        &self,
        id: &str,
        status: JobStatus,
        message: &str,
        error_message: Option<&str>,
    ) -> Result<Option<Job>, JobStoreError> {
        debug_assert!(status.is_terminal(), "finish() needs a terminal status");

        let conn = self.conn()?;
        let now = Utc::now();
        let progress_floor: u8 = if status == JobStatus::Completed { 100 } else { 0 };

        let changed = conn.execute(
            &format!(
                "UPDATE jobs SET status = ?, progress = MAX(progress, ?), stage = ?, message = ?, \
                 error_message = ?, updated_at = ? WHERE id = ? AND {}",
                NOT_TERMINAL
            ),
            params![
                status.as_str(),
                progress_floor,
                terminal_stage(status).as_str(),
                message,
                error_message,
                now.to_rfc3339(),
                id,
            ],
        )?;

        if changed == 0 {
            return Self::refused(&conn, id);
        }

        Self::fetch(&conn, id)
    }

    fn list_active(&self) -> Result<Vec<Job>, JobStoreError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE {} ORDER BY created_at ASC",
            JOB_COLUMNS, NOT_TERMINAL
        ))?;

        let rows = stmt.query_map([], Self::row_to_job)?;

        let mut jobs = Vec::new();
        for row_result in rows {
            jobs.push(row_result?);
        }
        Ok(jobs)
    }

    fn delete(&self, id: &str) -> Result<Job, JobStoreError> {
        let conn = self.conn()?;

        let job = Self::fetch(&conn, id)?.ok_or_else(|| JobStoreError::NotFound(id.to_string()))?;
        conn.execute("DELETE FROM jobs WHERE id = ?", params![id])?;

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> SqliteJobStore {
        SqliteJobStore::in_memory().unwrap()
    }

    const URL: &str = "https://www.tiktok.com/@chef/video/123";

    #[test]
    fn test_create_job() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        assert!(!job.id.is_empty());
        assert_eq!(job.url, URL);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.stage, "pending");
    }

    #[test]
    fn test_get_job() {
        let store = create_test_store();
        let created = store.create(URL).unwrap();

        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.url, URL);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn test_get_nonexistent_job() {
        let store = create_test_store();
        assert!(store.get("nonexistent-id").unwrap().is_none());
    }

    #[test]
    fn test_update_progress_maps_stage_to_status() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        let updated = store
            .update_progress(
                &job.id,
                &ProgressUpdate::new(Stage::Info, "Fetching video information...", 10)
                    .with_video_title("Shakshuka"),
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, JobStatus::Downloading);
        assert_eq!(updated.stage, "info");
        assert_eq!(updated.progress, 10);
        assert_eq!(updated.video_title.as_deref(), Some("Shakshuka"));
    }

    #[test]
    fn test_update_progress_keeps_title_when_absent() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        store
            .update_progress(
                &job.id,
                &ProgressUpdate::new(Stage::Info, "Video: Shakshuka", 15).with_video_title("Shakshuka"),
            )
            .unwrap();
        let updated = store
            .update_progress(&job.id, &ProgressUpdate::new(Stage::Download, "Downloading", 20))
            .unwrap()
            .unwrap();

        assert_eq!(updated.video_title.as_deref(), Some("Shakshuka"));
    }

    #[test]
    fn test_progress_never_decreases() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        store
            .update_progress(&job.id, &ProgressUpdate::new(Stage::Transcribe, "Transcribing", 50))
            .unwrap();
        let updated = store
            .update_progress(&job.id, &ProgressUpdate::new(Stage::Visual, "Visual", 40))
            .unwrap()
            .unwrap();

        assert_eq!(updated.progress, 50);
        assert_eq!(updated.status, JobStatus::Extracting);
    }

    #[test]
    fn test_terminal_job_ignores_progress() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        store
            .finish(&job.id, JobStatus::Cancelled, "Cancelled by user", None)
            .unwrap()
            .unwrap();

        let result = store
            .update_progress(&job.id, &ProgressUpdate::new(Stage::Download, "Downloading", 20))
            .unwrap();
        assert!(result.is_none());

        let fetched = store.get(&job.id).unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_update_progress_nonexistent_job() {
        let store = create_test_store();
        let result = store.update_progress("missing", &ProgressUpdate::new(Stage::Info, "x", 1));
        assert!(matches!(result, Err(JobStoreError::NotFound(_))));
    }

    #[test]
    fn test_finish_only_once() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        let failed = store
            .finish(&job.id, JobStatus::Failed, "Failed", Some("Video download failed: 404"))
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.stage, "error");
        assert_eq!(failed.error_message.as_deref(), Some("Video download failed: 404"));

        let second = store
            .finish(&job.id, JobStatus::Completed, "Done", None)
            .unwrap();
        assert!(second.is_none());
        assert_eq!(store.get(&job.id).unwrap().unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn test_finish_completed_sets_full_progress() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        let completed = store
            .finish(&job.id, JobStatus::Completed, "Recipe uploaded successfully!", None)
            .unwrap()
            .unwrap();
        assert_eq!(completed.progress, 100);
        assert_eq!(completed.stage, "complete");
    }

    #[test]
    fn test_list_active_excludes_terminal() {
        let store = create_test_store();
        let a = store.create(URL).unwrap();
        let b = store.create(URL).unwrap();
        store.create(URL).unwrap();

        store.finish(&a.id, JobStatus::Completed, "Done", None).unwrap();
        store
            .update_progress(&b.id, &ProgressUpdate::new(Stage::Download, "Downloading", 20))
            .unwrap();

        let active = store.list_active().unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|j| !j.is_terminal()));

        let count = store.count(&JobFilter::new().active()).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_list_with_status_filter() {
        let store = create_test_store();
        let a = store.create(URL).unwrap();
        store.create(URL).unwrap();
        store.finish(&a.id, JobStatus::Failed, "Failed", Some("boom")).unwrap();

        let failed = store
            .list(&JobFilter::new().with_status(JobStatus::Failed))
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, a.id);
    }

    #[test]
    fn test_list_pagination() {
        let store = create_test_store();
        for _ in 0..5 {
            store.create(URL).unwrap();
        }

        assert_eq!(store.list(&JobFilter::new().with_limit(2)).unwrap().len(), 2);
        assert_eq!(
            store
                .list(&JobFilter::new().with_limit(2).with_offset(4))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_delete_job() {
        let store = create_test_store();
        let job = store.create(URL).unwrap();

        let deleted = store.delete(&job.id).unwrap();
        assert_eq!(deleted.id, job.id);
        assert!(store.get(&job.id).unwrap().is_none());
        assert!(matches!(store.delete(&job.id), Err(JobStoreError::NotFound(_))));
    }

    #[test]
    fn test_file_based_store_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("jobs.db");

        let id = {
            let store = SqliteJobStore::new(&db_path).unwrap();
            let job = store.create(URL).unwrap();
            store
                .update_progress(&job.id, &ProgressUpdate::new(Stage::Transcribe, "Transcribing", 35))
                .unwrap();
            job.id
        };

        let reopened = SqliteJobStore::new(&db_path).unwrap();
        let job = reopened.get(&id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Transcribing);
        assert_eq!(job.progress, 35);
    }
}
