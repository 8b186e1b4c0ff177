//! Job rows: exactly-once insert plus read helpers.
//!
//! Deduplication is enforced by the partial unique index on `source_id`;
//! callers never lock. An insert that hits an existing row is reported as
//! "not new" rather than an error.

use crate::error::{DatabaseError, Result};
use chrono::{DateTime, Utc};
use jobhunt_core::canonical::url_source_id;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};

/// A job ready to be stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    /// Company display name
    pub company: String,
    /// Posting title
    pub title: String,
    /// Location text
    pub location: String,
    /// `Remote`, `Hybrid`, `Onsite` or `Unknown`
    pub work_mode: String,
    /// Posting URL (required)
    pub url: String,
    /// Rule score
    pub score: i64,
    /// Matched rule tags, first-seen order
    pub tags: Vec<String>,
    /// Posting or receipt time
    pub date: DateTime<Utc>,
    /// Dedup key; derived from the URL when empty
    pub source_id: String,
    /// Connector that first reported the job
    pub seen_from_source: String,
    /// Cached logo key, empty when unknown
    pub logo_key: String,
}

/// A stored job row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Row id
    pub id: i64,
    /// Company display name
    pub company: String,
    /// Posting title
    pub title: String,
    /// Location text
    pub location: String,
    /// Work mode label
    pub work_mode: String,
    /// Posting URL
    pub url: String,
    /// Rule score
    pub score: i64,
    /// Matched rule tags
    pub tags: Vec<String>,
    /// RFC 3339 date
    pub date: String,
    /// Dedup key
    pub source_id: String,
    /// Connector that first reported the job
    pub seen_from_source: String,
    /// Cached logo key
    pub logo_key: String,
}

fn or_default(value: &str, default: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Insert a job unless its `source_id` is already stored.
///
/// Blank company, title, location and work mode are replaced by
/// placeholders. When the row already exists and `logo_key` is set, the
/// existing row's empty logo key is backfilled.
///
/// Returns `true` when a new row was written.
///
/// # Errors
/// Returns `DatabaseError::Validation` when the URL is blank.
pub async fn insert_job_if_new(pool: &Pool<Sqlite>, job: &NewJob) -> Result<bool> {
    let url = job.url.trim();
    if url.is_empty() {
        return Err(DatabaseError::Validation("missing url".to_string()));
    }

    let source_id = match job.source_id.trim() {
        "" => url_source_id(url),
        id => id.to_string(),
    };
    let logo_key = job.logo_key.trim();
    let tags = serde_json::to_string(&job.tags).map_err(|e| DatabaseError::Decode(e.to_string()))?;

    let result = sqlx::query(
        "INSERT OR IGNORE INTO jobs (company, title, location, work_mode, url, score, tags,
                                     date, source_id, seen_from_source, logo_key)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(or_default(&job.company, "Unknown"))
    .bind(or_default(&job.title, "Job Posting"))
    .bind(or_default(&job.location, "Unknown"))
    .bind(or_default(&job.work_mode, "Unknown"))
    .bind(url)
    .bind(job.score)
    .bind(&tags)
    .bind(job.date.to_rfc3339())
    .bind(&source_id)
    .bind(job.seen_from_source.trim())
    .bind(logo_key)
    .execute(pool)
    .await?;

    let inserted = result.rows_affected() > 0;
    if !inserted && !logo_key.is_empty() {
        set_logo_key_if_missing(pool, &source_id, logo_key).await?;
    }

    Ok(inserted)
}

/// Set `logo_key` on the row with `source_id` if it has none yet.
///
/// Returns `true` if a row was updated.
pub async fn set_logo_key_if_missing(
    pool: &Pool<Sqlite>,
    source_id: &str,
    logo_key: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE jobs SET logo_key = ?
         WHERE source_id = ? AND (logo_key = '' OR logo_key IS NULL)",
    )
    .bind(logo_key)
    .bind(source_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Newest jobs first, at most `limit` rows.
pub async fn list_jobs(pool: &Pool<Sqlite>, limit: i64) -> Result<Vec<Job>> {
    let rows = sqlx::query(
        "SELECT id, company, title, location, work_mode, url, score, tags, date,
                source_id, seen_from_source, logo_key
         FROM jobs
         ORDER BY date DESC, id DESC
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let tags_json: String = row.try_get("tags")?;
            let tags = serde_json::from_str(&tags_json).map_err(|e| {
                DatabaseError::Decode(format!("invalid tags JSON '{tags_json}': {e}"))
            })?;
            Ok(Job {
                id: row.try_get("id")?,
                company: row.try_get("company")?,
                title: row.try_get("title")?,
                location: row.try_get("location")?,
                work_mode: row.try_get("work_mode")?,
                url: row.try_get("url")?,
                score: row.try_get("score")?,
                tags,
                date: row.try_get("date")?,
                source_id: row.try_get("source_id")?,
                seen_from_source: row.try_get("seen_from_source")?,
                logo_key: row.try_get("logo_key")?,
            })
        })
        .collect()
}

/// Total number of stored jobs.
pub async fn count_jobs(pool: &Pool<Sqlite>) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
