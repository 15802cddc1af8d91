#![forbid(unsafe_code)]

//! SQLite-backed artifact store.
//!
//! The engine does not own the persistence schema design; this module
//! bootstraps the relational tables the domain registry maps onto and offers
//! insert helpers for embedding callers and test fixtures. The connection is
//! shared behind a mutex: the executor and any number of streaming results
//! hold clones of the handle, and each acquires the lock only for the
//! duration of one statement.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::criteria::ItemTypeValue;
use crate::error::{ExecutionError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo TEXT NOT NULL,
    path TEXT,
    name TEXT NOT NULL,
    type INTEGER NOT NULL DEFAULT 1,
    depth INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL DEFAULT 0,
    created_by TEXT,
    modified INTEGER NOT NULL DEFAULT 0,
    modified_by TEXT,
    updated INTEGER NOT NULL DEFAULT 0,
    sha1 TEXT,
    md5 TEXT,
    sha256 TEXT
);
CREATE TABLE IF NOT EXISTS stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items (id),
    downloads INTEGER NOT NULL DEFAULT 0,
    downloaded INTEGER NOT NULL DEFAULT 0,
    downloaded_by TEXT
);
CREATE TABLE IF NOT EXISTS properties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items (id),
    prop_key TEXT NOT NULL,
    prop_value TEXT
);
CREATE TABLE IF NOT EXISTS archives (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items (id)
);
CREATE TABLE IF NOT EXISTS archive_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    archive_id INTEGER NOT NULL REFERENCES archives (id),
    name TEXT NOT NULL,
    path TEXT
);
CREATE TABLE IF NOT EXISTS builds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    build_name TEXT NOT NULL,
    build_number TEXT,
    build_url TEXT,
    created INTEGER NOT NULL DEFAULT 0,
    created_by TEXT
);
CREATE INDEX IF NOT EXISTS idx_items_repo ON items (repo);
CREATE INDEX IF NOT EXISTS idx_items_name ON items (name);
CREATE INDEX IF NOT EXISTS idx_stats_item ON stats (item_id);
CREATE INDEX IF NOT EXISTS idx_properties_item ON properties (item_id);
CREATE INDEX IF NOT EXISTS idx_archives_item ON archives (item_id);
CREATE INDEX IF NOT EXISTS idx_entries_archive ON archive_entries (archive_id);
";

/// Shared handle to the backing store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) a store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(ExecutionError::Storage)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(ExecutionError::Storage)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(ExecutionError::Storage)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(ExecutionError::Storage)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(ExecutionError::Storage)?;
        conn.execute_batch(SCHEMA).map_err(ExecutionError::Storage)?;
        debug!("store schema bootstrapped");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Inserts an item row, returning its id.
    pub fn insert_item(&self, item: &ItemRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO items (repo, path, name, type, depth, size, created, created_by, \
             modified, modified_by, updated, sha1, md5, sha256) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                item.repo,
                item.path,
                item.name,
                item.item_type.ordinal().unwrap_or(1),
                item.depth,
                item.size,
                item.created,
                item.created_by,
                item.modified,
                item.modified_by,
                item.updated,
                item.sha1,
                item.md5,
                item.sha256,
            ],
        )
        .map_err(ExecutionError::Storage)?;
        Ok(conn.last_insert_rowid())
    }

    /// Attaches download statistics to an item.
    pub fn insert_stats(
        &self,
        item_id: i64,
        downloads: i64,
        downloaded: i64,
        downloaded_by: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO stats (item_id, downloads, downloaded, downloaded_by) \
             VALUES (?1, ?2, ?3, ?4)",
            params![item_id, downloads, downloaded, downloaded_by],
        )
        .map_err(ExecutionError::Storage)?;
        Ok(conn.last_insert_rowid())
    }

    /// Attaches a key/value property to an item.
    pub fn insert_property(&self, item_id: i64, key: &str, value: Option<&str>) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO properties (item_id, prop_key, prop_value) VALUES (?1, ?2, ?3)",
            params![item_id, key, value],
        )
        .map_err(ExecutionError::Storage)?;
        Ok(conn.last_insert_rowid())
    }

    /// Registers an archive payload for an item.
    pub fn insert_archive(&self, item_id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute("INSERT INTO archives (item_id) VALUES (?1)", params![item_id])
            .map_err(ExecutionError::Storage)?;
        Ok(conn.last_insert_rowid())
    }

    /// Adds an entry to an archive.
    pub fn insert_archive_entry(
        &self,
        archive_id: i64,
        name: &str,
        path: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO archive_entries (archive_id, name, path) VALUES (?1, ?2, ?3)",
            params![archive_id, name, path],
        )
        .map_err(ExecutionError::Storage)?;
        Ok(conn.last_insert_rowid())
    }

    /// Inserts a build record.
    pub fn insert_build(&self, build: &BuildRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO builds (build_name, build_number, build_url, created, created_by) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                build.name,
                build.number,
                build.url,
                build.created,
                build.created_by,
            ],
        )
        .map_err(ExecutionError::Storage)?;
        Ok(conn.last_insert_rowid())
    }
}

/// Item row for [`SqliteStore::insert_item`].
#[derive(Clone, Debug)]
pub struct ItemRecord {
    pub repo: String,
    pub path: Option<String>,
    pub name: String,
    pub item_type: ItemTypeValue,
    pub depth: i64,
    pub size: i64,
    /// Epoch milliseconds; zero means "absent".
    pub created: i64,
    pub created_by: Option<String>,
    pub modified: i64,
    pub modified_by: Option<String>,
    pub updated: i64,
    pub sha1: Option<String>,
    pub md5: Option<String>,
    pub sha256: Option<String>,
}

impl Default for ItemRecord {
    fn default() -> Self {
        Self {
            repo: String::new(),
            path: None,
            name: String::new(),
            item_type: ItemTypeValue::File,
            depth: 0,
            size: 0,
            created: 0,
            created_by: None,
            modified: 0,
            modified_by: None,
            updated: 0,
            sha1: None,
            md5: None,
            sha256: None,
        }
    }
}

/// Build row for [`SqliteStore::insert_build`].
#[derive(Clone, Debug, Default)]
pub struct BuildRecord {
    pub name: String,
    pub number: Option<String>,
    pub url: Option<String>,
    pub created: i64,
    pub created_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aql.db");
        let first = SqliteStore::open(&path).unwrap();
        drop(first);
        // Re-opening re-runs the schema batch without error.
        SqliteStore::open(&path).unwrap();
    }

    #[test]
    fn inserts_return_monotonic_ids() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store
            .insert_item(&ItemRecord {
                repo: "libs-release".into(),
                name: "a.jar".into(),
                ..ItemRecord::default()
            })
            .unwrap();
        let b = store
            .insert_item(&ItemRecord {
                repo: "libs-release".into(),
                name: "b.jar".into(),
                ..ItemRecord::default()
            })
            .unwrap();
        assert!(b > a);
        let archive = store.insert_archive(a).unwrap();
        store
            .insert_archive_entry(archive, "META-INF", Some("META-INF"))
            .unwrap();
    }
}
