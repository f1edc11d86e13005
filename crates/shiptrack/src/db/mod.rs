//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) with a thread-safe `Database` handle.
//! All access is serialized through a `Mutex<Connection>`, so a closure
//! passed to [`Database::with_conn`] sees no interleaved writes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

pub mod error;
pub mod migrations;
pub mod shipment_repo;
pub mod status_log_repo;

pub use error::DatabaseError;

/// Thread-safe database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). WAL mode is enabled for file databases.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction. Commits when `f` succeeds, rolls back
    /// (on drop) when it fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }
}

/// Returns the canonical database path: `~/.shiptrack/data/shiptrack.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".shiptrack").join("data").join("shiptrack.db"))
}

/// Formats an instant the way every timestamp column stores it: RFC 3339,
/// nanosecond precision (lossless), explicit `+00:00` offset.
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, false)
}

/// Parses a stored timestamp column back into an instant.
pub fn parse_timestamp(column: &'static str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::InvalidRow {
            column,
            reason: format!("'{}' is not an RFC 3339 timestamp: {}", value, e),
        })
}
