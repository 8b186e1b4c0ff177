//! JobHunt Database Layer
//!
//! Provides `SQLite` access for persisted jobs and the enrichment caches.
//! Uses `SQLx` with embedded migrations.
//!
//! # Architecture
//!
//! - **Single writer**: one pooled connection, WAL journal, 5 s busy timeout
//! - **Migrations**: SQL migrations are embedded and versioned using `SQLx`
//! - **Deduplication**: a partial unique index on `jobs.source_id`
//!
//! # Example
//!
//! ```ignore
//! use jobhunt_db::Database;
//!
//! let db = Database::new("jobhunt.db").await?;
//! db.run_migrations().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod company_domains;
pub mod connection;
pub mod error;
pub mod jobs;
pub mod logos;
pub mod migrations;

// Re-export commonly used types
pub use connection::JobPool;
pub use error::{DatabaseError, Result};
pub use jobs::{Job, NewJob};

use std::path::Path;

/// High-level database interface.
///
/// Wraps a [`JobPool`] and exposes migrations. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: JobPool,
}

impl Database {
    /// Open the database at `path` (or `:memory:`).
    ///
    /// # Errors
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let pool = JobPool::new(path).await?;
        Ok(Self { pool })
    }

    /// Run all pending database migrations.
    ///
    /// # Errors
    /// Returns `DatabaseError::Migration` if any migration fails.
    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.pool.pool()).await
    }

    /// Get the current schema version.
    pub async fn get_schema_version(&self) -> Result<i64> {
        migrations::get_schema_version(self.pool.pool()).await
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Sqlite> {
        self.pool.pool()
    }

    /// Close the database connection gracefully.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_migrations() {
        let db = Database::new(":memory:").await.expect("create database");

        let version_before = db.get_schema_version().await.expect("get version");
        assert_eq!(version_before, 0);

        db.run_migrations().await.expect("run migrations");

        let version_after = db.get_schema_version().await.expect("get version");
        assert_eq!(version_after, 2);
    }

    #[tokio::test]
    async fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("jobs.db");

        let db = Database::new(&path).await.expect("create database");
        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await
            .expect("journal mode");
        assert_eq!(mode.to_lowercase(), "wal");

        db.close().await;
        assert!(path.exists());
    }
}
