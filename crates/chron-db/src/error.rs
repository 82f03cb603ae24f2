//! Database error types for chron-db.

use chron_core::errors::{CaptureError, CoreError, DiffError};
use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed or returned data that could not be parsed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A page cursor could not be decoded.
    #[error("Invalid page cursor: {0}")]
    InvalidCursor(String),

    /// A stored or incoming record violated a domain rule.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A stored diff document could not be encoded or decoded.
    #[error(transparent)]
    Diff(#[from] DiffError),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<DatabaseError> for CaptureError {
    fn from(e: DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}
