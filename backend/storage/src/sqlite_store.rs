//! SQLite-backed durable key-value store.
//!
//! Plays the role browser local storage plays for a web client: a flat
//! `kv` table of string keys and string values that survives restarts.
//! Several processes may open the same file; `update` runs in an
//! immediate transaction so their read-modify-write cycles do not interleave.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};
use visionex_core::{KeyValueStore, StorageError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
);";

const SELECT_VALUE: &str = "SELECT value FROM kv WHERE key = ?1";
const UPSERT_VALUE: &str = "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, strftime('%s','now'))
     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Backend(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;
        conn.execute_batch(&format!("PRAGMA journal_mode=WAL;\n{SCHEMA}"))
            .map_err(backend)?;

        info!("SqliteKvStore opened at {:?}", path);
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("sqlite connection lock poisoned".to_string()))
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StorageError> {
        let conn = self.lock()?;
        f(&conn).map_err(backend)
    }
}

fn backend(e: rusqlite::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(SELECT_VALUE, params![key], |row| row.get(0))
                .optional()
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(UPSERT_VALUE, params![key, value])
        })?;
        debug!(key, "kv set");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| conn.execute("DELETE FROM kv WHERE key = ?1", params![key]))?;
        debug!(key, "kv remove");
        Ok(())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<String>) -> Result<String, StorageError>,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(backend)?;
        let current: Option<String> = tx
            .query_row(SELECT_VALUE, params![key], |row| row.get(0))
            .optional()
            .map_err(backend)?;
        // Dropping `tx` on error rolls back.
        let next = f(current)?;
        tx.execute(UPSERT_VALUE, params![key, next]).map_err(backend)?;
        tx.commit().map_err(backend)?;
        debug!(key, "kv update");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_kv_roundtrip() {
        let store = SqliteKvStore::in_memory().expect("in-memory db");
        store.set("model_cached_a", "true").unwrap();
        assert_eq!(store.get("model_cached_a").unwrap().as_deref(), Some("true"));

        store.set("model_cached_a", "false").unwrap();
        assert_eq!(store.get("model_cached_a").unwrap().as_deref(), Some("false"));

        store.remove("model_cached_a").unwrap();
        assert_eq!(store.get("model_cached_a").unwrap(), None);
    }

    #[test]
    fn test_sqlite_kv_persists_across_reopen() {
        let dir = std::env::temp_dir().join(format!("visionex-kv-{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.db");
        {
            let store = SqliteKvStore::open(&path).unwrap();
            store.set("greeting", "hello").unwrap();
        }
        let store = SqliteKvStore::open(&path).unwrap();
        assert_eq!(store.get("greeting").unwrap().as_deref(), Some("hello"));
        drop(store);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_sqlite_update_is_atomic_across_connections() {
        let dir = std::env::temp_dir().join(format!("visionex-kv-{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.db");
        let first = SqliteKvStore::open(&path).unwrap();
        let second = SqliteKvStore::open(&path).unwrap();

        std::thread::scope(|scope| {
            for store in [&first, &second] {
                scope.spawn(move || {
                    for _ in 0..50 {
                        store
                            .update("counter", &mut |current| {
                                let n: u32 = current.as_deref().unwrap_or("0").parse().unwrap();
                                Ok((n + 1).to_string())
                            })
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(first.get("counter").unwrap().as_deref(), Some("100"));
        drop((first, second));
        let _ = std::fs::remove_dir_all(dir);
    }
}
