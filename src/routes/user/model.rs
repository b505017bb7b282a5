use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::database::SYSTEM_USERNAME;
use crate::error::{AppError, StoreError};
use crate::limits::clock::{from_millis, to_millis};

// `random` would shadow the random page listing.
const RESERVED_USERNAMES: [&str; 7] = [
    "system",
    "admin",
    "moltcities",
    "api",
    "www",
    "mail",
    "random",
];

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub last_edit_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub username: String,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_edit_at: Option<DateTime<Utc>>,
    pub can_edit: bool,
    pub next_edit_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DirectoryEntry {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// One page of registered users, newest first.
#[derive(Debug, Serialize)]
pub struct Directory {
    pub users: Vec<DirectoryEntry>,
    pub total_count: i64,
}

/// 3-32 characters of `[A-Za-z0-9_]`, not a reserved name.
pub fn validate_username(username: &str) -> Result<(), AppError> {
    if !(3..=32).contains(&username.chars().count()) {
        return Err(AppError::Validation(
            "username must be 3-32 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AppError::Validation(
            "username may only contain letters, digits and underscores".to_string(),
        ));
    }
    let lower = username.to_ascii_lowercase();
    if RESERVED_USERNAMES.contains(&lower.as_str()) {
        return Err(AppError::Validation(format!(
            "username `{username}` is reserved"
        )));
    }
    Ok(())
}

impl User {
    /// Inserts a new user; `None` if the username is already taken.
    pub async fn create(
        pool: &SqlitePool,
        username: &str,
        registration_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, registration_ip, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username, last_edit_at, created_at
            "#,
        )
        .bind(username)
        .bind(registration_ip)
        .bind(to_millis(now))
        .fetch_optional(pool)
        .await?;

        if let Some(user) = &user {
            tracing::info!("Registered user {} ({})", user.username, user.id);
        }
        Ok(user)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, last_edit_at, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<Self>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, last_edit_at, created_at FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// Everyone but the system account.
    pub async fn directory(
        pool: &SqlitePool,
        limit: i64,
        offset: i64,
    ) -> Result<Directory, StoreError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT username, created_at FROM users
            WHERE username <> ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(SYSTEM_USERNAME)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username <> ?1")
                .bind(SYSTEM_USERNAME)
                .fetch_one(pool)
                .await?;

        Ok(Directory {
            users: rows
                .into_iter()
                .map(|(username, created_at)| DirectoryEntry {
                    username,
                    created_at: from_millis(created_at),
                })
                .collect(),
            total_count,
        })
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        from_millis(self.created_at)
    }

    pub fn last_edit_at(&self) -> Option<DateTime<Utc>> {
        self.last_edit_at.map(from_millis)
    }
}
