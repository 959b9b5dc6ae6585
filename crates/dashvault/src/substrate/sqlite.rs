//! `SQLite`-backed durable substrate.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, trace};

use super::{migrations, KeyValueStore};
use crate::error::{Error, Result};

/// Durable key-value substrate stored in a single `SQLite` table.
///
/// Every key is one row of `entries`. Writes are single upserts, so a
/// record either lands whole or not at all.
#[derive(Debug)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection, shared with debounce timer tasks.
    conn: Mutex<Connection>,
    /// Optional limit on total key plus value bytes.
    quota: Option<usize>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist
    /// and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Mutex::new(conn),
            quota: None,
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
            quota: None,
        })
    }

    /// Limit the total bytes this store may hold.
    #[must_use]
    pub fn with_quota(mut self, quota: Option<usize>) -> Self {
        self.quota = quota;
        self
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get statistics about the store.
    ///
    /// `record_prefix` selects which keys count as user records.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self, record_prefix: &str) -> Result<SubstrateStats> {
        let conn = self.lock();

        let total_entries: i64 =
            conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;

        let user_records: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE substr(key, 1, length(?1)) = ?1",
            [record_prefix],
            |row| row.get(0),
        )?;

        let total_bytes: i64 = conn.query_row(
            "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0) FROM entries",
            [],
            |row| row.get(0),
        )?;

        let newest: Option<String> = conn
            .query_row(
                "SELECT updated_at FROM entries ORDER BY updated_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        let last_update = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(SubstrateStats {
            total_entries,
            user_records,
            total_bytes: u64::try_from(total_bytes).unwrap_or(0),
            last_update,
            db_size_bytes,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_quota(&self, conn: &Connection, key: &str, value: &str) -> Result<()> {
        let Some(quota) = self.quota else {
            return Ok(());
        };

        let others: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0) FROM entries WHERE key != ?1",
                [key],
                |row| row.get(0),
            )
            .map_err(|e| Error::storage_write(key, e.to_string()))?;

        let needed = usize::try_from(others).unwrap_or(usize::MAX) + key.len() + value.len();
        if needed > quota {
            return Err(Error::QuotaExceeded {
                key: key.to_string(),
                needed,
                quota,
            });
        }
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        self.lock()
            .query_row("SELECT value FROM entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| Error::storage_read(key, e.to_string()))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        self.check_quota(&conn, key, value)?;

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        conn.execute(
            r"
            INSERT INTO entries (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, now],
        )
        .map_err(|e| Error::storage_write(key, e.to_string()))?;

        trace!(key, bytes = value.len(), "sqlite write");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM entries WHERE key = ?1", [key])
            .map_err(|e| Error::storage_write(key, e.to_string()))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT key FROM entries ORDER BY rowid")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Statistics about a durable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstrateStats {
    /// Number of keys stored (records, sessions, legacy keys).
    pub total_entries: i64,
    /// Number of keys carrying the user record prefix.
    pub user_records: i64,
    /// Bytes of keys plus values.
    pub total_bytes: u64,
    /// When any entry was last written.
    pub last_update: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
