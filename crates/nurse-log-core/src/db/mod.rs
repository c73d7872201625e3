//! Relational store adapter (SQLite).

mod migrate;
mod records;
mod schema;

pub use migrate::*;
pub use records::*;
pub use schema::*;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

use crate::models::ValidationErrors;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate patient ID: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Store is at schema version {current}, expected {target}; run the migration first")]
    SchemaOutdated { current: i64, target: i64 },

    #[error("Unrecognized schema: {0}")]
    Schema(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
///
/// One `Database` is one store; callers construct it and pass it to every
/// operation instead of reaching for a shared handle.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Wrap an existing connection. An empty store is created at the latest
    /// schema; a legacy store is left as-is until [`Database::migrate`] runs.
    pub fn from_connection(conn: Connection) -> DbResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> DbResult<()> {
        let version = bootstrap_schema_version(&self.conn)?;
        tracing::debug!(version, "opened health record store");
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Fail unless the store is at the latest schema version.
    pub fn ensure_current_schema(&self) -> DbResult<()> {
        let current = current_schema_version(&self.conn)?;
        if current == LATEST_SCHEMA_VERSION {
            Ok(())
        } else {
            Err(DbError::SchemaOutdated {
                current,
                target: LATEST_SCHEMA_VERSION,
            })
        }
    }
}
