//! Progress persistence backends.
//!
//! The remote deployment keeps progress in an authenticated key/value store
//! keyed by `(user_key, content_id)`; [`ProgressBackend`] models exactly that
//! surface. [`SqliteBackend`] is the bundled local implementation.

use crate::error::{AppError, Result};
use crate::progress::ProgressRecord;
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Arc;

/// Key/value progress store keyed by `(user_key, content_id)`.
pub trait ProgressBackend: Send + Sync {
    /// Insert or replace the record for one content item.
    fn upsert(&self, user_key: &str, content_id: &str, record: &ProgressRecord) -> Result<()>;

    /// All records for one user, most recent first.
    fn list_for_user(&self, user_key: &str) -> Result<Vec<(String, ProgressRecord)>>;
}

/// SQLite-backed progress store.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open or create the progress database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open progress db: {e}")))?;
        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    /// Open an in-memory progress database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open progress db: {e}")))?;
        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS reading_progress (
                user_key TEXT NOT NULL,
                content_id TEXT NOT NULL,
                content_path TEXT NOT NULL,
                title TEXT NOT NULL,
                author TEXT,
                unit_index INTEGER NOT NULL,
                total_units INTEGER NOT NULL,
                progress_percent INTEGER NOT NULL,
                last_access_ms INTEGER NOT NULL,
                PRIMARY KEY (user_key, content_id)
            );

            CREATE INDEX IF NOT EXISTS idx_progress_recency
                ON reading_progress (user_key, last_access_ms DESC);
            "#,
        )?;
        Ok(())
    }
}

impl ProgressBackend for SqliteBackend {
    fn upsert(&self, user_key: &str, content_id: &str, record: &ProgressRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO reading_progress
                (user_key, content_id, content_path, title, author,
                 unit_index, total_units, progress_percent, last_access_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (user_key, content_id) DO UPDATE SET
                content_path = excluded.content_path,
                title = excluded.title,
                author = excluded.author,
                unit_index = excluded.unit_index,
                total_units = excluded.total_units,
                progress_percent = excluded.progress_percent,
                last_access_ms = excluded.last_access_ms
            "#,
            params![
                user_key,
                content_id,
                record.content_path,
                record.title,
                record.author,
                record.unit_index,
                record.total_units,
                record.progress_percent,
                record.last_access_ms,
            ],
        )?;
        Ok(())
    }

    fn list_for_user(&self, user_key: &str) -> Result<Vec<(String, ProgressRecord)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT content_id, content_path, title, author,
                   unit_index, total_units, progress_percent, last_access_ms
            FROM reading_progress
            WHERE user_key = ?1
            ORDER BY last_access_ms DESC
            "#,
        )?;

        let rows = stmt.query_map(params![user_key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ProgressRecord {
                    content_path: row.get(1)?,
                    title: row.get(2)?,
                    author: row.get(3)?,
                    unit_index: row.get(4)?,
                    total_units: row.get(5)?,
                    progress_percent: row.get(6)?,
                    last_access_ms: row.get(7)?,
                },
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
