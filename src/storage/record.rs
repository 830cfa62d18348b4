use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{StorageBackend, StorageResult};
use crate::error::StorageError;
use crate::note::{iso8601, Note};

/// Schema version - increment when making schema changes
pub const SCHEMA_VERSION: i32 = 1;

/// Transactional record store on SQLite, one row per note keyed by id.
///
/// rusqlite is blocking, so every call runs on the blocking pool and is
/// bounded by `timeout`. A call that does not finish in time is reported as
/// failed, and its transaction is abandoned instead of committed.
#[derive(Clone)]
pub struct RecordStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    timeout: Duration,
}

impl RecordStore {
    pub fn open(path: impl Into<PathBuf>, timeout: Duration) -> StorageResult<Self> {
        let path = path.into();
        info!(path = %path.display(), "Opening record store");

        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(&path)?
        };
        apply_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            timeout,
        })
    }

    /// In-memory database, for tests and throwaway sessions.
    pub fn memory(timeout: Duration) -> StorageResult<Self> {
        Self::open(":memory:", timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection, &AtomicBool) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let abandoned = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&abandoned);

        let handle = tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn, &flag)
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(joined) => joined.map_err(|e| StorageError::Task(e.to_string()))?,
            Err(_) => {
                abandoned.store(true, Ordering::SeqCst);
                let millis = self.timeout.as_millis() as u64;
                warn!(op, millis, "Record store transaction timed out");
                Err(StorageError::Timeout {
                    backend: "record",
                    millis,
                })
            }
        }
    }

    #[cfg(test)]
    fn lock_for_test(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

#[async_trait]
impl StorageBackend for RecordStore {
    fn name(&self) -> &'static str {
        "record"
    }

    async fn load_all(&self) -> StorageResult<Vec<Note>> {
        self.run("load_all", |conn, _| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let rows = {
                let mut stmt = tx.prepare(
                    "SELECT id, title, content, created_at, updated_at FROM notes ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            tx.finish()?;

            let notes = rows
                .into_iter()
                .map(|(id, title, content, created_at, updated_at)| {
                    Ok(Note {
                        id,
                        title,
                        content,
                        created_at: parse_column(id, "created_at", &created_at)?,
                        updated_at: parse_column(id, "updated_at", &updated_at)?,
                    })
                })
                .collect::<StorageResult<Vec<_>>>()?;
            debug!(count = notes.len(), "Loaded records");
            Ok(notes)
        })
        .await
    }

    async fn save_all(&self, notes: &[Note]) -> StorageResult<()> {
        let notes = notes.to_vec();
        self.run("save_all", move |conn, abandoned| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute("DELETE FROM notes", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO notes (id, title, content, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for note in &notes {
                    stmt.execute(params![
                        note.id,
                        note.title,
                        note.content,
                        iso8601::format(&note.created_at),
                        iso8601::format(&note.updated_at),
                    ])?;
                }
            }

            // Dropping the transaction rolls it back
            if abandoned.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable(
                    "record store transaction abandoned after timeout".to_string(),
                ));
            }
            tx.commit()?;
            debug!(count = notes.len(), "Saved records");
            Ok(())
        })
        .await
    }
}

fn parse_column(
    id: i64,
    column: &str,
    raw: &str,
) -> StorageResult<chrono::DateTime<chrono::Utc>> {
    iso8601::parse(raw).ok_or_else(|| {
        StorageError::Corrupt(format!("note {} has an invalid {} '{}'", id, column, raw))
    })
}

/// Apply all pending migrations
fn apply_migrations(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = get_current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "Checking migrations");

    if current_version > SCHEMA_VERSION {
        return Err(StorageError::Corrupt(format!(
            "record store schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }
    if current_version < 1 {
        info!(from = current_version, to = SCHEMA_VERSION, "Applying schema migrations");
        conn.execute_batch(SCHEMA_V1)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [1])?;
    }
    Ok(())
}

fn get_current_version(conn: &Connection) -> StorageResult<i32> {
    let version: Option<i32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
