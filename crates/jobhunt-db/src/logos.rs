//! Logo image cache.
//!
//! Images are keyed by the SHA-256 of the URL they were fetched from, so a
//! job row can reference a logo by key before or after it is downloaded.

use crate::error::Result;
use chrono::Utc;
use jobhunt_core::canonical::hash_string;
use sqlx::{Pool, Sqlite};

/// A cached image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logo {
    /// `image/*` MIME type
    pub content_type: String,
    /// Raw image bytes
    pub bytes: Vec<u8>,
    /// RFC 3339 fetch time
    pub fetched_at: String,
}

/// Cache key for an image URL.
#[must_use]
pub fn logo_key_for_url(url: &str) -> String {
    hash_string(url)
}

/// True if a logo with `key` is stored.
pub async fn logo_exists(pool: &Pool<Sqlite>, key: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM logos WHERE key = ? LIMIT 1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Store (or replace) a logo.
pub async fn put_logo(pool: &Pool<Sqlite>, key: &str, content_type: &str, bytes: &[u8]) -> Result<()> {
    sqlx::query(
        "INSERT OR REPLACE INTO logos (key, content_type, bytes, fetched_at) VALUES (?, ?, ?, ?)",
    )
    .bind(key)
    .bind(content_type)
    .bind(bytes)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    tracing::debug!("Cached logo {} ({} bytes)", key, bytes.len());
    Ok(())
}

/// Fetch a stored logo.
pub async fn get_logo(pool: &Pool<Sqlite>, key: &str) -> Result<Option<Logo>> {
    let row: Option<(String, Vec<u8>, String)> =
        sqlx::query_as("SELECT content_type, bytes, fetched_at FROM logos WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(content_type, bytes, fetched_at)| Logo {
        content_type,
        bytes,
        fetched_at,
    }))
}
