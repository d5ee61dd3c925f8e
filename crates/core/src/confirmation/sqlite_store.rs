//! SQLite-backed pending upload store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};

use super::{
    NewPendingUpload, PendingUpload, PendingUploadError, PendingUploadStore, UploadResolution,
    UploadStatus,
};

const UPLOAD_COLUMNS: &str = "id, job_id, recipe_data, image_candidates, best_image_index, \
     selected_image_index, targets, status, created_at, expires_at";

/// SQLite-backed pending upload store.
pub struct SqlitePendingUploadStore {
    conn: Mutex<Connection>,
}

impl SqlitePendingUploadStore {
    pub fn new(path: &Path) -> Result<Self, PendingUploadError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, PendingUploadError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PendingUploadError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_uploads (
                id TEXT PRIMARY KEY,
                job_id TEXT NOT NULL,
                recipe_data TEXT NOT NULL,
                image_candidates TEXT NOT NULL DEFAULT '[]',
                best_image_index INTEGER,
                selected_image_index INTEGER,
                targets TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_uploads_live_job
                ON pending_uploads(job_id) WHERE status = 'pending';
            "#,
        )?;
        Ok(())
    }

    fn list_where(&self, condition: &str) -> Result<Vec<PendingUpload>, PendingUploadError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_uploads WHERE {} ORDER BY created_at ASC",
            UPLOAD_COLUMNS, condition
        ))?;
        let rows = stmt.query_map([], Self::row_to_upload)?;

        let mut uploads = Vec::new();
        for row_result in rows {
            uploads.push(row_result?);
        }
        Ok(uploads)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PendingUploadError> {
        self.conn
            .lock()
            .map_err(|_| PendingUploadError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_upload(row: &rusqlite::Row) -> rusqlite::Result<PendingUpload> {
        let recipe_json: String = row.get(2)?;
        let candidates_json: String = row.get(3)?;
        let best: Option<i64> = row.get(4)?;
        let selected: Option<i64> = row.get(5)?;
        let targets_json: String = row.get(6)?;
        let status_str: String = row.get(7)?;
        let created_at_str: String = row.get(8)?;
        let expires_at_str: String = row.get(9)?;

        Ok(PendingUpload {
            id: row.get(0)?,
            job_id: row.get(1)?,
            recipe: serde_json::from_str(&recipe_json).unwrap_or(serde_json::Value::Null),
            image_candidates: serde_json::from_str(&candidates_json).unwrap_or_default(),
            best_image_index: best.map(|i| i as usize),
            selected_image_index: selected.map(|i| i as usize),
            targets: serde_json::from_str(&targets_json).unwrap_or_default(),
            status: status_str.parse().unwrap_or(UploadStatus::Expired),
            created_at: parse_timestamp(&created_at_str),
            expires_at: parse_timestamp(&expires_at_str),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<PendingUpload>, PendingUploadError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM pending_uploads WHERE id = ?", UPLOAD_COLUMNS),
            params![id],
            Self::row_to_upload,
        );

        match result {
            Ok(upload) => Ok(Some(upload)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

impl PendingUploadStore for SqlitePendingUploadStore {
    fn create(&self, upload: NewPendingUpload) -> Result<PendingUpload, PendingUploadError> {
        let conn = self.conn()?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        let recipe_json = serde_json::to_string(&upload.recipe)?;
        let candidates_json = serde_json::to_string(&upload.image_candidates)?;
        let targets_json = serde_json::to_string(&upload.targets)?;
        let best = upload.best_image_index.map(|i| i as i64);

        let result = conn.execute(
            &format!(
                "INSERT INTO pending_uploads ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                UPLOAD_COLUMNS
            ),
            params![
                id,
                upload.job_id,
                recipe_json,
                candidates_json,
                best,
                best,
                targets_json,
                UploadStatus::Pending.as_str(),
                now.to_rfc3339(),
                upload.expires_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(PendingUploadError::AlreadyPending(upload.job_id));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(PendingUpload {
            id,
            job_id: upload.job_id,
            recipe: upload.recipe,
            image_candidates: upload.image_candidates,
            best_image_index: upload.best_image_index,
            selected_image_index: upload.best_image_index,
            targets: upload.targets,
            status: UploadStatus::Pending,
            created_at: now,
            expires_at: upload.expires_at,
        })
    }

    fn get(&self, id: &str) -> Result<Option<PendingUpload>, PendingUploadError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn find_pending_for_job(
        &self,
        job_id: &str,
    ) -> Result<Option<PendingUpload>, PendingUploadError> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM pending_uploads WHERE job_id = ? AND status = 'pending'",
                UPLOAD_COLUMNS
            ),
            params![job_id],
            Self::row_to_upload,
        );

        match result {
            Ok(upload) => Ok(Some(upload)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(
        &self,
        id: &str,
        resolution: UploadResolution,
    ) -> Result<PendingUpload, PendingUploadError> {
        let conn = self.conn()?;

        let current = Self::fetch(&conn, id)?
            .filter(PendingUpload::is_pending)
            .ok_or_else(|| PendingUploadError::NotFound(id.to_string()))?;

        let override_index = match resolution {
            UploadResolution::Confirm {
                selected_image_index: Some(index),
            } => {
                if index >= current.image_candidates.len() {
                    return Err(PendingUploadError::InvalidImageIndex {
                        index,
                        available: current.image_candidates.len(),
                    });
                }
                Some(index as i64)
            }
            _ => None,
        };

        // The status guard makes this the single winner even when another
        // process shares the database file.
        let changed = conn.execute(
            "UPDATE pending_uploads SET status = ?, \
             selected_image_index = COALESCE(?, selected_image_index) \
             WHERE id = ? AND status = 'pending'",
            params![resolution.status().as_str(), override_index, id],
        )?;

        if changed == 0 {
            return Err(PendingUploadError::NotFound(id.to_string()));
        }

        Self::fetch(&conn, id)?.ok_or_else(|| PendingUploadError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<bool, PendingUploadError> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM pending_uploads WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }

    fn list_pending(&self) -> Result<Vec<PendingUpload>, PendingUploadError> {
        self.list_where("status = 'pending'")
    }

    fn list_resolved(&self) -> Result<Vec<PendingUpload>, PendingUploadError> {
        self.list_where("status != 'pending'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::ExportTarget;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    fn create_test_store() -> SqlitePendingUploadStore {
        SqlitePendingUploadStore::in_memory().unwrap()
    }

    fn new_upload(job_id: &str) -> NewPendingUpload {
        NewPendingUpload {
            job_id: job_id.to_string(),
            recipe: json!({"name": "Shakshuka", "recipeYield": "2"}),
            image_candidates: (0..4).map(|i| format!("tmp/vid/frame_{:02}.jpg", i)).collect(),
            best_image_index: Some(1),
            targets: vec![ExportTarget::Tandoor],
            expires_at: Utc::now() + ChronoDuration::minutes(5),
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = create_test_store();
        let upload = store.create(new_upload("job-1")).unwrap();

        assert_eq!(upload.status, UploadStatus::Pending);
        assert_eq!(upload.selected_image_index, Some(1));
        assert_ne!(upload.id, upload.job_id);

        let fetched = store.get(&upload.id).unwrap().unwrap();
        assert_eq!(fetched.recipe["name"], "Shakshuka");
        assert_eq!(fetched.image_candidates.len(), 4);
        assert_eq!(fetched.targets, vec![ExportTarget::Tandoor]);
    }

    #[test]
    fn test_one_live_upload_per_job() {
        let store = create_test_store();
        let first = store.create(new_upload("job-1")).unwrap();

        let second = store.create(new_upload("job-1"));
        assert!(matches!(second, Err(PendingUploadError::AlreadyPending(_))));

        // Once resolved, a new one may be created
        store.resolve(&first.id, UploadResolution::Cancel).unwrap();
        assert!(store.create(new_upload("job-1")).is_ok());
    }

    #[test]
    fn test_confirm_with_image_override() {
        let store = create_test_store();
        let upload = store.create(new_upload("job-1")).unwrap();

        let confirmed = store
            .resolve(
                &upload.id,
                UploadResolution::Confirm {
                    selected_image_index: Some(2),
                },
            )
            .unwrap();

        assert_eq!(confirmed.status, UploadStatus::Confirmed);
        assert_eq!(confirmed.selected_image_index, Some(2));
        assert_eq!(confirmed.selected_image(), Some("tmp/vid/frame_02.jpg"));
    }

    #[test]
    fn test_confirm_without_override_keeps_best() {
        let store = create_test_store();
        let upload = store.create(new_upload("job-1")).unwrap();

        let confirmed = store
            .resolve(
                &upload.id,
                UploadResolution::Confirm {
                    selected_image_index: None,
                },
            )
            .unwrap();
        assert_eq!(confirmed.selected_image_index, Some(1));
    }

    #[test]
    fn test_resolve_exactly_once() {
        let store = create_test_store();
        let upload = store.create(new_upload("job-1")).unwrap();

        store.resolve(&upload.id, UploadResolution::Cancel).unwrap();

        let again = store.resolve(
            &upload.id,
            UploadResolution::Confirm {
                selected_image_index: None,
            },
        );
        assert!(matches!(again, Err(PendingUploadError::NotFound(_))));
        assert_eq!(
            store.get(&upload.id).unwrap().unwrap().status,
            UploadStatus::Cancelled
        );
    }

    #[test]
    fn test_invalid_image_index_leaves_upload_pending() {
        let store = create_test_store();
        let upload = store.create(new_upload("job-1")).unwrap();

        let result = store.resolve(
            &upload.id,
            UploadResolution::Confirm {
                selected_image_index: Some(9),
            },
        );
        assert!(matches!(
            result,
            Err(PendingUploadError::InvalidImageIndex {
                index: 9,
                available: 4
            })
        ));
        assert!(store.get(&upload.id).unwrap().unwrap().is_pending());
    }

    #[test]
    fn test_resolve_unknown() {
        let store = create_test_store();
        let result = store.resolve("nope", UploadResolution::Expire);
        assert!(matches!(result, Err(PendingUploadError::NotFound(_))));
    }

    #[test]
    fn test_find_pending_and_list() {
        let store = create_test_store();
        let a = store.create(new_upload("job-a")).unwrap();
        let b = store.create(new_upload("job-b")).unwrap();
        store.resolve(&b.id, UploadResolution::Expire).unwrap();

        assert_eq!(
            store.find_pending_for_job("job-a").unwrap().map(|u| u.id),
            Some(a.id)
        );
        assert!(store.find_pending_for_job("job-b").unwrap().is_none());
        assert_eq!(store.list_pending().unwrap().len(), 1);

        let resolved = store.list_resolved().unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, b.id);
    }

    #[test]
    fn test_delete() {
        let store = create_test_store();
        let upload = store.create(new_upload("job-1")).unwrap();

        assert!(store.delete(&upload.id).unwrap());
        assert!(!store.delete(&upload.id).unwrap());
        assert!(store.get(&upload.id).unwrap().is_none());
    }

    #[test]
    fn test_two_connections_resolve_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("uploads.db");

        let process_a = SqlitePendingUploadStore::new(&db_path).unwrap();
        let process_b = SqlitePendingUploadStore::new(&db_path).unwrap();

        let upload = process_a.create(new_upload("job-1")).unwrap();

        process_b
            .resolve(
                &upload.id,
                UploadResolution::Confirm {
                    selected_image_index: Some(3),
                },
            )
            .unwrap();

        let lost = process_a.resolve(&upload.id, UploadResolution::Expire);
        assert!(matches!(lost, Err(PendingUploadError::NotFound(_))));

        let seen_by_a = process_a.get(&upload.id).unwrap().unwrap();
        assert_eq!(seen_by_a.status, UploadStatus::Confirmed);
        assert_eq!(seen_by_a.selected_image_index, Some(3));
    }
}
