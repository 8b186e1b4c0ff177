//! Cache of company name to website domain.

use crate::error::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

/// Lower-case and collapse whitespace so "ACME  Corp" and "acme corp" share
/// one entry.
#[must_use]
pub fn normalize_company_key(company: &str) -> String {
    company
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cached domain for `company`, if any.
pub async fn get_company_domain(pool: &Pool<Sqlite>, company: &str) -> Result<Option<String>> {
    let key = normalize_company_key(company);
    if key.is_empty() {
        return Ok(None);
    }

    let domain: Option<String> =
        sqlx::query_scalar("SELECT domain FROM company_domains WHERE company = ? LIMIT 1")
            .bind(&key)
            .fetch_optional(pool)
            .await?;

    Ok(domain
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty()))
}

/// Store or refresh the domain for `company`. Blank inputs are ignored.
pub async fn upsert_company_domain(pool: &Pool<Sqlite>, company: &str, domain: &str) -> Result<()> {
    let key = normalize_company_key(company);
    let domain = domain.trim().to_lowercase();
    if key.is_empty() || domain.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r"
        INSERT INTO company_domains (company, domain, fetched_at)
        VALUES (?, ?, ?)
        ON CONFLICT(company) DO UPDATE SET
            domain = excluded.domain,
            fetched_at = excluded.fetched_at
        ",
    )
    .bind(&key)
    .bind(&domain)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn create_test_db() -> Database {
        let db = Database::new(":memory:")
            .await
            .expect("create test database");
        db.run_migrations().await.expect("run migrations");
        db
    }

    #[test]
    fn test_normalize_company_key() {
        assert_eq!(normalize_company_key("  ACME   Corp "), "acme corp");
        assert_eq!(normalize_company_key(""), "");
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = create_test_db().await;

        assert_eq!(get_company_domain(db.pool(), "Acme").await.expect("get"), None);

        upsert_company_domain(db.pool(), "Acme  Corp", " Acme.COM ")
            .await
            .expect("upsert");
        assert_eq!(
            get_company_domain(db.pool(), "acme corp").await.expect("get"),
            Some("acme.com".to_string())
        );

        upsert_company_domain(db.pool(), "ACME CORP", "acme.io")
            .await
            .expect("upsert again");
        assert_eq!(
            get_company_domain(db.pool(), "Acme Corp").await.expect("get"),
            Some("acme.io".to_string())
        );
    }

    #[tokio::test]
    async fn test_blank_values_ignored() {
        let db = create_test_db().await;
        upsert_company_domain(db.pool(), "Acme", "  ").await.expect("upsert");
        upsert_company_domain(db.pool(), " ", "acme.com").await.expect("upsert");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM company_domains")
            .fetch_one(db.pool())
            .await
            .expect("count");
        assert_eq!(count, 0);
    }
}
