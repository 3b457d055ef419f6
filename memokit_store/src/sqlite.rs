//! SQLite-backed cache store.
//!
//! Entries survive process restarts, so several processes pointed at the same
//! file share one cache. Expiry is stored as Unix milliseconds.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::backend::CacheBackend;
use crate::errors::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);
";

/// A live row of the store, as returned by [`SqliteStore::entries`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub key: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Cache store persisted in a SQLite database.
///
/// `rusqlite::Connection` is not `Sync`, so the connection lives behind a
/// mutex and every operation is serialized.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn).map_err(StoreError::from)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = now_millis();
        self.with_conn(|conn| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((value, expires_at)) if now < expires_at => Ok(Some(value)),
                Some(_) => {
                    conn.execute(
                        "DELETE FROM cache_entries WHERE key = ?1 AND expires_at <= ?2",
                        params![key, now],
                    )?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    pub fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_ms);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expires_at],
            )
            .map(|_| ())
        })
    }

    /// Removes `key`, returning whether a row existed.
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                .map(|n| n > 0)
        })
    }

    pub fn clear(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| conn.execute("DELETE FROM cache_entries", []))
    }

    /// Deletes every expired row and returns how many were removed.
    pub fn sweep(&self) -> Result<usize, StoreError> {
        let now = now_millis();
        let removed = self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now],
            )
        })?;
        tracing::debug!("swept {} expired cache entries", removed);
        Ok(removed)
    }

    /// Lists live entries ordered by key.
    pub fn entries(&self) -> Result<Vec<StoredEntry>, StoreError> {
        let now = now_millis();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, expires_at FROM cache_entries
                 WHERE expires_at > ?1 ORDER BY key",
            )?;
            let rows = stmt.query_map(params![now], |row| {
                let expires_at: i64 = row.get(2)?;
                Ok(StoredEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    expires_at: DateTime::from_timestamp_millis(expires_at)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC),
                })
            })?;
            rows.collect()
        })
    }

    /// Count of rows on disk, expired or not.
    pub fn len(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(1) FROM cache_entries", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
        })
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl CacheBackend for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        SqliteStore::get(self, key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        SqliteStore::set(self, key, value, ttl)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
