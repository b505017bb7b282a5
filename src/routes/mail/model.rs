use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{AppError, StoreError};
use crate::limits::clock::{from_millis, to_millis};

pub const MAX_MAIL_BYTES: usize = 10 * 1024;
/// Inbox listings show at most this many characters of each body.
pub const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct SendMailRequest {
    pub to: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SentMail {
    pub id: i64,
    pub to: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MailDeleted {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct InboxEntry {
    pub id: i64,
    pub from: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Inbox {
    pub messages: Vec<InboxEntry>,
    pub unread_count: i64,
    pub total_count: i64,
}

#[derive(Debug, Serialize)]
pub struct Mail {
    pub id: i64,
    pub from: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MailRow {
    id: i64,
    from_username: String,
    body: String,
    read_at: Option<i64>,
    created_at: i64,
}

pub fn validate_mail_body(body: &str) -> Result<(), AppError> {
    if body.is_empty() {
        return Err(AppError::Validation("message body is required".to_string()));
    }
    if body.len() > MAX_MAIL_BYTES {
        return Err(AppError::TooLarge(format!(
            "message too large, maximum size is {MAX_MAIL_BYTES} bytes"
        )));
    }
    Ok(())
}

fn preview(body: &str) -> String {
    match body.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

impl Mail {
    pub async fn send(
        pool: &SqlitePool,
        from_user_id: i64,
        to_user_id: i64,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO mail (from_user_id, to_user_id, body, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id
            "#,
        )
        .bind(from_user_id)
        .bind(to_user_id)
        .bind(body)
        .bind(to_millis(now))
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    /// Newest first, with bodies cut down to a preview.
    pub async fn inbox(
        pool: &SqlitePool,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Inbox, StoreError> {
        let (total_count, unread_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(CASE WHEN read_at IS NULL THEN 1 END)
            FROM mail WHERE to_user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        let rows: Vec<MailRow> = sqlx::query_as(
            r#"
            SELECT m.id, u.username AS from_username, m.body, m.read_at, m.created_at
            FROM mail m JOIN users u ON u.id = m.from_user_id
            WHERE m.to_user_id = ?1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let messages = rows
            .into_iter()
            .map(|row| InboxEntry {
                id: row.id,
                from: row.from_username,
                body: preview(&row.body),
                read: row.read_at.is_some(),
                created_at: from_millis(row.created_at),
            })
            .collect();

        Ok(Inbox {
            messages,
            unread_count,
            total_count,
        })
    }

    /// Returns mail `id` addressed to `user_id` and marks it read on first open.
    pub async fn open(
        pool: &SqlitePool,
        user_id: i64,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, StoreError> {
        sqlx::query(
            "UPDATE mail SET read_at = ?1 WHERE id = ?2 AND to_user_id = ?3 AND read_at IS NULL",
        )
        .bind(to_millis(now))
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        let row: Option<MailRow> = sqlx::query_as(
            r#"
            SELECT m.id, u.username AS from_username, m.body, m.read_at, m.created_at
            FROM mail m JOIN users u ON u.id = m.from_user_id
            WHERE m.id = ?1 AND m.to_user_id = ?2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|row| Mail {
            id: row.id,
            from: row.from_username,
            body: row.body,
            read_at: row.read_at.map(from_millis),
            created_at: from_millis(row.created_at),
        }))
    }

    /// Deletes mail `id` if it was addressed to `user_id`.
    pub async fn delete(pool: &SqlitePool, user_id: i64, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM mail WHERE id = ?1 AND to_user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::database::test_support::{insert_user, open_temp};

    #[test]
    fn preview_cuts_on_char_boundaries() {
        assert_eq!(preview("short"), "short");
        let long = "ü".repeat(PREVIEW_CHARS + 5);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn body_size_is_counted_in_bytes() {
        assert!(validate_mail_body("").is_err());
        assert!(validate_mail_body(&"a".repeat(MAX_MAIL_BYTES)).is_ok());
        assert!(matches!(
            validate_mail_body(&"a".repeat(MAX_MAIL_BYTES + 1)),
            Err(AppError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn opening_marks_read_once() {
        let (pool, _dir) = open_temp(1).await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let t0 = Utc::now();

        let id = Mail::send(&pool, alice, bob, "hello bob", t0).await.unwrap();
        Mail::send(&pool, alice, bob, "second", t0 + Duration::seconds(1)).await.unwrap();

        let inbox = Mail::inbox(&pool, bob, 50, 0).await.unwrap();
        assert_eq!((inbox.total_count, inbox.unread_count), (2, 2));
        assert_eq!(inbox.messages[0].body, "second");

        let t1 = t0 + Duration::minutes(5);
        let mail = Mail::open(&pool, bob, id, t1).await.unwrap().unwrap();
        assert_eq!(mail.from, "alice");
        assert_eq!(mail.read_at.unwrap().timestamp_millis(), t1.timestamp_millis());

        // A second open keeps the first read time.
        let again = Mail::open(&pool, bob, id, t1 + Duration::hours(1)).await.unwrap().unwrap();
        assert_eq!(again.read_at, mail.read_at);

        // Only the recipient can open it.
        assert!(Mail::open(&pool, alice, id, t1).await.unwrap().is_none());
        assert_eq!(Mail::inbox(&pool, bob, 50, 0).await.unwrap().unread_count, 1);
    }

    #[tokio::test]
    async fn only_the_recipient_can_delete() {
        let (pool, _dir) = open_temp(1).await;
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;

        let id = Mail::send(&pool, alice, bob, "delete me", Utc::now()).await.unwrap();

        assert!(!Mail::delete(&pool, alice, id).await.unwrap());
        assert!(Mail::delete(&pool, bob, id).await.unwrap());
        assert!(!Mail::delete(&pool, bob, id).await.unwrap());
        assert_eq!(Mail::inbox(&pool, bob, 50, 0).await.unwrap().total_count, 0);
    }
}
