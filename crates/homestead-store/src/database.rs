//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.
//!
//! A [`StoreHandle`] is created once by the hosting process and hands out a
//! fresh connection per request. Nothing is cached in globals; concurrent
//! requests coordinate only through SQLite's own locking.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use homestead_shared::constants::SQLITE_BUSY_TIMEOUT_MS;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| unavailable(path, e))?;

        // Recommended SQLite settings.
        configure(&conn).map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::CannotOpen) => unavailable(path, e),
            _ => StoreError::Sqlite(e),
        })?;

        // Run schema migrations.
        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    /// Begin a write transaction that takes SQLite's write lock up front, so
    /// reads inside it see the state the writes apply to.
    pub(crate) fn write_tx(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    /// Begin a read transaction for a consistent multi-query snapshot.
    pub(crate) fn read_tx(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Deferred,
        )?)
    }
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_millis(SQLITE_BUSY_TIMEOUT_MS))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")
}

fn unavailable(path: &Path, e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(format!("cannot open '{}': {}", path.display(), e))
}

/// Process-owned handle to the inquiry database.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    path: Arc<PathBuf>,
}

impl StoreHandle {
    /// Create the parent directory, apply migrations once and return a
    /// handle that later requests open connections from.
    pub fn init(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening inquiry database");
        Database::open_at(&path)?;

        Ok(Self {
            path: Arc::new(path),
        })
    }

    /// Open a connection for one request.
    pub fn open(&self) -> Result<Database> {
        Database::open_at(&self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = Database::open_at(&path).expect("should open");
        assert!(db.path().is_some());
    }

    #[test]
    fn handle_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("inquiries.db");

        let handle = StoreHandle::init(&path).unwrap();
        assert!(path.exists());
        assert!(handle.open().is_ok());
    }

    #[test]
    fn unopenable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("inquiries.db");
        let err = Database::open_at(&path).err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_storage());
    }
}
