use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{AppError, StoreError};
use crate::limits::clock::{from_millis, to_millis};

pub const MAX_DESCRIPTION_CHARS: usize = 256;
pub const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<i64>,
    /// Only messages posted strictly after this instant.
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub id: i64,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ChannelRow {
    id: i64,
    name: String,
    description: String,
    created_by: String,
    created_at: i64,
    message_count: i64,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            id: row.id,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            created_at: from_millis(row.created_at),
            message_count: row.message_count,
        }
    }
}

#[derive(FromRow)]
struct MessageRow {
    id: i64,
    username: String,
    content: String,
    created_at: i64,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            username: row.username,
            content: row.content,
            created_at: from_millis(row.created_at),
        }
    }
}

/// Lower-cases `name` and checks it is 3-32 characters of `[a-z0-9-]`.
pub fn normalize_channel_name(name: &str) -> Result<String, AppError> {
    let name = name.trim().to_lowercase();
    if !(3..=32).contains(&name.chars().count()) {
        return Err(AppError::Validation(
            "channel name must be 3-32 characters".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AppError::Validation(
            "channel name may only contain letters, digits and hyphens".to_string(),
        ));
    }
    Ok(name)
}

pub fn validate_description(description: &str) -> Result<(), AppError> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_message(content: &str) -> Result<(), AppError> {
    let len = content.chars().count();
    if len == 0 || content.trim().is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }
    if len > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "message must be at most {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(())
}

const CHANNEL_SELECT: &str = r#"
    SELECT c.id, c.name, c.description, u.username AS created_by, c.created_at,
           (SELECT COUNT(*) FROM messages m WHERE m.channel_id = c.id) AS message_count
    FROM channels c JOIN users u ON u.id = c.created_by
"#;

impl Channel {
    pub async fn list(pool: &SqlitePool) -> Result<Vec<Self>, StoreError> {
        let rows: Vec<ChannelRow> =
            sqlx::query_as(&format!("{CHANNEL_SELECT} ORDER BY c.id ASC"))
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(Channel::from).collect())
    }

    pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Self>, StoreError> {
        let row: Option<ChannelRow> = sqlx::query_as(&format!("{CHANNEL_SELECT} WHERE c.name = ?1"))
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Channel::from))
    }

    /// Creates a channel; `None` if the name is taken.
    pub async fn create(
        pool: &SqlitePool,
        name: &str,
        description: &str,
        created_by: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, StoreError> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO channels (name, description, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(created_by)
        .bind(to_millis(now))
        .fetch_optional(pool)
        .await?;

        match id {
            Some(_) => Self::find_by_name(pool, name).await,
            None => Ok(None),
        }
    }
}

impl Message {
    /// The `limit` most recent messages of a channel, oldest first.
    pub async fn recent(
        pool: &SqlitePool,
        channel_id: i64,
        limit: i64,
    ) -> Result<Vec<Self>, StoreError> {
        let mut rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT m.id, u.username, m.content, m.created_at
            FROM messages m JOIN users u ON u.id = m.user_id
            WHERE m.channel_id = ?1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT ?2
            "#,
        )
        .bind(channel_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        rows.reverse();
        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Up to `limit` messages posted after `since`, oldest first.
    pub async fn since(
        pool: &SqlitePool,
        channel_id: i64,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Self>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT m.id, u.username, m.content, m.created_at
            FROM messages m JOIN users u ON u.id = m.user_id
            WHERE m.channel_id = ?1 AND m.created_at > ?2
            ORDER BY m.created_at ASC, m.id ASC
            LIMIT ?3
            "#,
        )
        .bind(channel_id)
        .bind(to_millis(since))
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    pub async fn create(
        pool: &SqlitePool,
        channel_id: i64,
        user_id: i64,
        username: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO messages (channel_id, user_id, content, created_at)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(content)
        .bind(to_millis(now))
        .fetch_one(pool)
        .await?;

        Ok(Message {
            id,
            username: username.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }
}
