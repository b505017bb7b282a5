use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

const SCHEMA: &str = include_str!("schema.sql");

/// Owner of the `general` channel; cannot log in.
pub const SYSTEM_USERNAME: &str = "system";
pub const DEFAULT_CHANNEL: &str = "general";

/// Opens (creating if needed) the SQLite store and applies the schema.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    seed(&pool).await?;

    tracing::info!("Database ready at {}", database_url);
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

// Idempotent: both inserts are no-ops on an existing store.
async fn seed(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().timestamp_millis();

    sqlx::query(
        "INSERT OR IGNORE INTO users (username, registration_ip, created_at) VALUES (?1, 'system', ?2)",
    )
    .bind(SYSTEM_USERNAME)
    .bind(now)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO channels (name, description, created_by, created_at)
        SELECT ?1, 'Default channel for coordination', id, ?2 FROM users WHERE username = ?3
        "#,
    )
    .bind(DEFAULT_CHANNEL)
    .bind(now)
    .bind(SYSTEM_USERNAME)
    .execute(pool)
    .await?;

    Ok(())
}
