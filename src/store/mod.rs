//! Relational store backed by embedded `SQLite`.
//!
//! The schema enforces the pipeline's structural invariants: per-entity
//! uniqueness keys, ON-DELETE cascades from the workspace, and the partial
//! unique index on `(workspace_id, kind, reference_id) WHERE resolved = 0`
//! that makes blocker upserts race-free.
//!
//! All mutating pipeline work runs inside a single transaction per engine
//! invocation; the connection is shared behind a mutex and checked out for
//! exactly the duration of that transaction.
//!
//! Timestamps cross this boundary as unix milliseconds; domain code uses
//! `chrono::DateTime<Utc>`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

pub mod activity;
pub mod blockers;
pub mod deliveries;
pub mod features;
pub mod members;
pub mod pull_requests;
pub mod schema;
pub mod workspaces;

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle to the shared database connection.
///
/// Cloning is cheap; all clones refer to the same connection. Engine runs
/// lock the connection, open a transaction, and release the lock when the
/// transaction ends, so a run never holds the lock across an await point.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a fresh in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::init(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Checks the connection out. Callers open a transaction on the guard.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Converts a domain timestamp to its stored representation.
pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}
