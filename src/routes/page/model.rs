use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{AppError, StoreError};
use crate::limits::clock::{from_millis, to_millis};

pub const MAX_PAGE_BYTES: usize = 100 * 1024;

/// Served with every user page; pages may not run script or load remote
/// resources other than images.
pub const PAGE_CSP: &str =
    "default-src 'none'; style-src 'unsafe-inline'; img-src * data:; font-src data:";

#[derive(Debug, Serialize)]
pub struct PageUpdated {
    pub url: String,
    pub size: usize,
}

/// The caller's own page, or where it would live.
#[derive(Debug, Serialize)]
pub struct MyPage {
    pub exists: bool,
    pub url: String,
    #[serde(flatten)]
    pub summary: Option<PageSummary>,
}

#[derive(Debug, Serialize)]
pub struct PageDeleted {
    pub deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct RandomPagesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PageListing {
    pub pages: Vec<PageSummary>,
    pub total_count: i64,
}

/// Size is in bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub username: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SummaryRow {
    username: String,
    size: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<SummaryRow> for PageSummary {
    fn from(row: SummaryRow) -> Self {
        PageSummary {
            username: row.username,
            size: row.size,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        }
    }
}

const SUMMARY_SELECT: &str = r#"
    SELECT u.username, LENGTH(CAST(p.content AS BLOB)) AS size, p.created_at, p.updated_at
    FROM pages p JOIN users u ON u.id = p.user_id
"#;

pub fn validate_page(content: &[u8]) -> Result<(), AppError> {
    if content.is_empty() {
        return Err(AppError::Validation("page content cannot be empty".to_string()));
    }
    if content.len() > MAX_PAGE_BYTES {
        return Err(AppError::TooLarge(format!(
            "page too large, maximum size is {MAX_PAGE_BYTES} bytes"
        )));
    }
    Ok(())
}

pub struct Page;

impl Page {
    pub async fn upsert(
        pool: &SqlitePool,
        user_id: i64,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pages (user_id, content, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT (user_id) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(content)
        .bind(to_millis(now))
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn content_for(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<String>, StoreError> {
        let content = sqlx::query_scalar(
            r#"
            SELECT p.content FROM pages p JOIN users u ON u.id = p.user_id
            WHERE u.username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(content)
    }

    pub async fn summary_for(
        pool: &SqlitePool,
        user_id: i64,
    ) -> Result<Option<PageSummary>, StoreError> {
        let row: Option<SummaryRow> =
            sqlx::query_as(&format!("{SUMMARY_SELECT} WHERE p.user_id = ?1"))
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(PageSummary::from))
    }

    /// Removes the user's page; `false` if there was none.
    pub async fn delete(pool: &SqlitePool, user_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pages WHERE user_id = ?1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Up to `limit` pages in random order, with the total number of pages.
    pub async fn random(pool: &SqlitePool, limit: i64) -> Result<PageListing, StoreError> {
        let rows: Vec<SummaryRow> =
            sqlx::query_as(&format!("{SUMMARY_SELECT} ORDER BY RANDOM() LIMIT ?1"))
                .bind(limit)
                .fetch_all(pool)
                .await?;
        let total_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pages")
            .fetch_one(pool)
            .await?;

        Ok(PageListing {
            pages: rows.into_iter().map(PageSummary::from).collect(),
            total_count,
        })
    }
}
