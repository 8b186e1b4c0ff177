//! Database error types.
//!
//! Provides error handling for database operations using `thiserror`.

use jobhunt_core::JobhuntError;
use thiserror::Error;

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open or create database connection.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// A row was rejected before reaching SQLite.
    #[error("invalid record: {0}")]
    Validation(String),

    /// Failed to decode database value.
    #[error("decode error: {0}")]
    Decode(String),

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DatabaseError> for JobhuntError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Validation(msg) => Self::Validation(msg),
            DatabaseError::Io(e) => Self::Io(e),
            other => Self::Database(other.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
