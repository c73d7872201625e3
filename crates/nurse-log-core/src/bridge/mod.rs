//! Bulk transfer between the relational store and tabular files.

mod export;
mod import;

pub use export::*;
pub use import::*;

use thiserror::Error;

use crate::db::DbError;
use crate::models::ValidationErrors;

/// Import/export errors. Row-level validation failures are not errors;
/// they are reported in [`ImportReport::skipped`].
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized headers: {0}")]
    Headers(ValidationErrors),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
