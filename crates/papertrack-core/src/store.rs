//! Best-effort local cache for the read and favorite sets.
//!
//! The server holds the authoritative sets; this copy only lets a session
//! show the last known state before the first server round-trip completes.
//! Neither [`LocalStore::load`] nor [`LocalStore::save`] ever fails the
//! caller: problems are logged and degrade to "re-sync from the server".

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use thiserror::Error;

use crate::PaperId;

/// Local cache key of the read set.
pub const READ_PAPERS_KEY: &str = "readPapers";

/// Local cache key of the favorite set.
pub const FAVORITE_PAPERS_KEY: &str = "favoritePapers";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Key/value persistence of paper id lists.
pub trait LocalStore: Send + Sync {
    /// The list stored under `key`, or empty if absent, malformed or unreadable.
    fn load(&self, key: &str) -> Vec<PaperId>;

    /// Replace the list stored under `key`. Failures are logged and swallowed.
    fn save(&self, key: &str, ids: &[PaperId]);

    /// Whether values survive the process.
    fn is_persistent(&self) -> bool;
}

/// Process-local store, used in tests and when no cache file is available.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON stored under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    /// Store a raw value as-is, bypassing serialization.
    pub fn put_raw(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }
}

impl LocalStore for MemoryStore {
    fn load(&self, key: &str) -> Vec<PaperId> {
        decode_or_empty(key, self.raw(key).as_deref())
    }

    fn save(&self, key: &str, ids: &[PaperId]) {
        match serde_json::to_string(ids) {
            Ok(json) => self.put_raw(key, &json),
            Err(e) => tracing::warn!(key, error = %e, "failed to serialize local cache entry"),
        }
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// SQLite-backed store: one `kv` table of JSON arrays.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS kv (
                 key   TEXT PRIMARY KEY,
                 value TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, ids: &[PaperId]) -> Result<(), StoreError> {
        let json = serde_json::to_string(ids)?;
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, json],
        )?;
        Ok(())
    }
}

impl LocalStore for SqliteStore {
    fn load(&self, key: &str) -> Vec<PaperId> {
        match self.read_raw(key) {
            Ok(raw) => decode_or_empty(key, raw.as_deref()),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read local cache");
                Vec::new()
            }
        }
    }

    fn save(&self, key: &str, ids: &[PaperId]) {
        if let Err(e) = self.write(key, ids) {
            tracing::warn!(key, error = %e, "failed to write local cache");
        }
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

fn decode_or_empty(key: &str, raw: Option<&str>) -> Vec<PaperId> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(ids) => ids,
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding malformed local cache entry");
            Vec::new()
        }
    }
}

/// Open the local cache.
///
/// If `path` is set, opens (creating if needed) a SQLite store there.
/// Otherwise, or if opening fails, returns an in-memory store.
pub fn open_store(path: Option<&Path>) -> Arc<dyn LocalStore> {
    if let Some(path) = path {
        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            tracing::warn!(path = %parent.display(), error = %e, "failed to create local cache directory");
        }
        match SqliteStore::open(path) {
            Ok(store) => {
                tracing::info!(path = %path.display(), "opened local cache");
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open local cache, falling back to in-memory");
            }
        }
    }
    Arc::new(MemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(xs: &[&str]) -> Vec<PaperId> {
        xs.iter().map(|x| PaperId::from(*x)).collect()
    }

    // ── MemoryStore ────────────────────────────────────────────────────

    #[test]
    fn absent_key_loads_empty() {
        let store = MemoryStore::new();
        assert!(store.load(FAVORITE_PAPERS_KEY).is_empty());
    }

    #[test]
    fn save_writes_json_array() {
        let store = MemoryStore::new();
        store.save(READ_PAPERS_KEY, &ids(&["https://x/p1", "https://x/p2"]));
        assert_eq!(
            store.raw(READ_PAPERS_KEY).unwrap(),
            r#"["https://x/p1","https://x/p2"]"#
        );
        assert_eq!(store.load(READ_PAPERS_KEY), ids(&["https://x/p1", "https://x/p2"]));
    }

    #[test]
    fn malformed_value_loads_empty() {
        let store = MemoryStore::new();
        store.put_raw(READ_PAPERS_KEY, "{not an array");
        assert!(store.load(READ_PAPERS_KEY).is_empty());
    }

    #[test]
    fn keys_are_independent() {
        let store = MemoryStore::new();
        store.save(READ_PAPERS_KEY, &ids(&["a"]));
        assert!(store.load(FAVORITE_PAPERS_KEY).is_empty());
    }

    // ── SqliteStore ────────────────────────────────────────────────────

    #[test]
    fn sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save(FAVORITE_PAPERS_KEY, &ids(&["https://x/paper1"]));
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load(FAVORITE_PAPERS_KEY), ids(&["https://x/paper1"]));
        assert!(store.load(READ_PAPERS_KEY).is_empty());
    }

    #[test]
    fn sqlite_save_replaces_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("cache.db")).unwrap();
        store.save(READ_PAPERS_KEY, &ids(&["a", "b"]));
        store.save(READ_PAPERS_KEY, &ids(&["b"]));
        assert_eq!(store.load(READ_PAPERS_KEY), ids(&["b"]));
    }

    #[test]
    fn sqlite_malformed_row_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let store = SqliteStore::open(&path).unwrap();
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![READ_PAPERS_KEY, "42"],
            )
            .unwrap();
        }
        assert!(store.load(READ_PAPERS_KEY).is_empty());
    }

    // ── open_store ─────────────────────────────────────────────────────

    #[test]
    fn none_path_returns_in_memory() {
        assert!(!open_store(None).is_persistent());
    }

    #[test]
    fn creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("cache.db");
        let store = open_store(Some(&path));
        assert!(store.is_persistent());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn unopenable_path_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let store = open_store(Some(dir.path()));
        assert!(!store.is_persistent());
        store.save(READ_PAPERS_KEY, &ids(&["a"]));
        assert_eq!(store.load(READ_PAPERS_KEY), ids(&["a"]));
    }

    #[test]
    fn uncreatable_parent_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let store = open_store(Some(&file.join("cache.db")));
        assert!(!store.is_persistent());
        assert!(file.is_file());
    }
}
