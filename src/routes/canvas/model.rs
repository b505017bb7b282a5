use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::canvas::{BLANK, Color, Rect};
use crate::database::SYSTEM_USERNAME;
use crate::error::StoreError;
use crate::limits::clock::{from_millis, to_millis};
use crate::limits::{EditGate, Eligibility};

#[derive(Debug, Deserialize)]
pub struct PointQuery {
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RegionQuery {
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PaintRequest {
    pub x: i64,
    pub y: i64,
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct PaintResponse {
    pub x: u32,
    pub y: u32,
    pub color: Color,
    pub next_edit_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EditStatusResponse {
    pub can_edit: bool,
    pub next_edit_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub color: Color,
    pub edited_by: Option<String>,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Edit {
    pub id: i64,
    pub x: u32,
    pub y: u32,
    pub color: Color,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A rectangle of the canvas, row-major: `pixels[row][col]`.
#[derive(Debug, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Vec<Color>>,
}

/// Service-wide activity counters.
#[derive(Debug, Serialize, FromRow)]
pub struct Stats {
    pub total_edits: i64,
    pub unique_pixels: i64,
    pub total_users: i64,
    pub total_channels: i64,
    pub total_messages: i64,
}

#[derive(FromRow)]
struct PixelRow {
    color: String,
    username: Option<String>,
    updated_at: i64,
}

#[derive(FromRow)]
struct EditRow {
    id: i64,
    color: String,
    username: String,
    created_at: i64,
}

// Stored colors were validated on the way in; anything else is corruption.
fn stored_color(raw: &str) -> Color {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!("Unparseable stored color {:?}, rendering blank", raw);
        BLANK
    })
}

impl Pixel {
    /// Current state of one pixel; never-painted pixels are blank.
    pub async fn get(pool: &SqlitePool, x: u32, y: u32) -> Result<Self, StoreError> {
        let row: Option<PixelRow> = sqlx::query_as(
            r#"
            SELECT c.color, u.username, c.updated_at
            FROM canvas c LEFT JOIN users u ON u.id = c.last_user_id
            WHERE c.x = ?1 AND c.y = ?2
            "#,
        )
        .bind(x)
        .bind(y)
        .fetch_optional(pool)
        .await?;

        Ok(match row {
            Some(row) => Pixel {
                x,
                y,
                color: stored_color(&row.color),
                edited_by: row.username,
                edited_at: Some(from_millis(row.updated_at)),
            },
            None => Pixel {
                x,
                y,
                color: BLANK,
                edited_by: None,
                edited_at: None,
            },
        })
    }

    /// Every painted pixel, for rendering.
    pub async fn all(pool: &SqlitePool) -> Result<Vec<(u32, u32, Color)>, StoreError> {
        let rows: Vec<(u32, u32, String)> = sqlx::query_as("SELECT x, y, color FROM canvas")
            .fetch_all(pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(x, y, color)| (x, y, stored_color(&color)))
            .collect())
    }

    /// Paints `(x, y)` if the edit gate lets `user_id` through.
    ///
    /// The cooldown stamp, the pixel and its history row commit together; a
    /// refused claim writes nothing.
    pub async fn paint(
        pool: &SqlitePool,
        gate: &EditGate,
        user_id: i64,
        x: u32,
        y: u32,
        color: Color,
    ) -> Result<Eligibility, StoreError> {
        let mut tx = pool.begin().await?;

        let eligibility = gate.claim(&mut *tx, user_id).await?;
        if !eligibility.is_eligible() {
            tx.rollback().await?;
            return Ok(eligibility);
        }

        let now = to_millis(gate.now());
        sqlx::query(
            r#"
            INSERT INTO canvas (x, y, color, last_user_id, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (x, y) DO UPDATE SET
                color = excluded.color,
                last_user_id = excluded.last_user_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(x)
        .bind(y)
        .bind(color.to_string())
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO edits (x, y, color, user_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(x)
        .bind(y)
        .bind(color.to_string())
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(user_id, x, y, %color, "pixel painted");
        Ok(eligibility)
    }
}

impl Region {
    pub async fn load(pool: &SqlitePool, rect: Rect) -> Result<Self, StoreError> {
        let rows: Vec<(u32, u32, String)> = sqlx::query_as(
            r#"
            SELECT x, y, color FROM canvas
            WHERE x >= ?1 AND x < ?2 AND y >= ?3 AND y < ?4
            "#,
        )
        .bind(rect.x)
        .bind(rect.x + rect.width)
        .bind(rect.y)
        .bind(rect.y + rect.height)
        .fetch_all(pool)
        .await?;

        let mut pixels = vec![vec![BLANK; rect.width as usize]; rect.height as usize];
        for (x, y, color) in rows {
            pixels[(y - rect.y) as usize][(x - rect.x) as usize] = stored_color(&color);
        }

        Ok(Region {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            pixels,
        })
    }
}

impl Stats {
    pub async fn load(pool: &SqlitePool) -> Result<Self, StoreError> {
        let stats: Stats = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM edits) AS total_edits,
                (SELECT COUNT(*) FROM canvas) AS unique_pixels,
                (SELECT COUNT(*) FROM users WHERE username <> ?1) AS total_users,
                (SELECT COUNT(*) FROM channels) AS total_channels,
                (SELECT COUNT(*) FROM messages) AS total_messages
            "#,
        )
        .bind(SYSTEM_USERNAME)
        .fetch_one(pool)
        .await?;
        Ok(stats)
    }
}

impl Edit {
    /// Most recent edits of `(x, y)`, newest first.
    pub async fn history(
        pool: &SqlitePool,
        x: u32,
        y: u32,
        limit: i64,
    ) -> Result<Vec<Self>, StoreError> {
        let rows: Vec<EditRow> = sqlx::query_as(
            r#"
            SELECT e.id, e.color, u.username, e.created_at
            FROM edits e JOIN users u ON u.id = e.user_id
            WHERE e.x = ?1 AND e.y = ?2
            ORDER BY e.created_at DESC, e.id DESC
            LIMIT ?3
            "#,
        )
        .bind(x)
        .bind(y)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Edit {
                id: row.id,
                x,
                y,
                color: stored_color(&row.color),
                username: row.username,
                created_at: from_millis(row.created_at),
            })
            .collect())
    }
}
