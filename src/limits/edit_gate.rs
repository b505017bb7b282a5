//! Per-user cooldown between gated writes, kept in `users.last_edit_at`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::clock::{Clock, from_millis, to_millis, window_cutoff};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    NotEligibleYet { next_eligible_at: DateTime<Utc> },
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::NotEligibleYet { next_eligible_at } => Some(*next_eligible_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EditGate {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl EditGate {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self {
            pool,
            clock,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Read-only view of whether `user_id` may edit right now.
    ///
    /// Only for reporting; gating a write must go through [`EditGate::claim`].
    pub async fn check_eligibility(&self, user_id: i64) -> Result<Eligibility, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let last_edit_at = last_edit_at(&mut conn, user_id).await?;
        Ok(self.eligibility_at(last_edit_at, self.clock.now()))
    }

    /// Stamps `last_edit_at = now` unconditionally.
    pub async fn record_edit(&self, user_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET last_edit_at = ?1 WHERE id = ?2")
            .bind(to_millis(self.clock.now()))
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownUser(user_id));
        }
        Ok(())
    }

    /// Checks eligibility and stamps `last_edit_at` in one conditional update.
    ///
    /// Run it on the transaction that performs the guarded write so the stamp
    /// commits or rolls back together with it. Of any number of concurrent
    /// claims for one user, at most one sees `Eligible`.
    pub async fn claim(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<Eligibility, StoreError> {
        let now = self.clock.now();

        let result = sqlx::query(
            r#"
            UPDATE users SET last_edit_at = ?1
            WHERE id = ?2 AND (last_edit_at IS NULL OR last_edit_at <= ?3)
            "#,
        )
        .bind(to_millis(now))
        .bind(user_id)
        .bind(window_cutoff(now, self.cooldown))
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(Eligibility::Eligible);
        }

        // Lost the race or still cooling down; report when the slot reopens.
        let last_edit_at = last_edit_at(conn, user_id).await?;
        match self.eligibility_at(last_edit_at, now) {
            Eligibility::Eligible => Ok(Eligibility::NotEligibleYet {
                next_eligible_at: now + self.cooldown,
            }),
            not_yet => Ok(not_yet),
        }
    }

    fn eligibility_at(&self, last_edit_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Eligibility {
        match last_edit_at {
            None => Eligibility::Eligible,
            Some(last) => {
                let next_eligible_at = last + self.cooldown;
                if now >= next_eligible_at {
                    Eligibility::Eligible
                } else {
                    Eligibility::NotEligibleYet { next_eligible_at }
                }
            }
        }
    }
}

async fn last_edit_at(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT last_edit_at FROM users WHERE id = ?1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some((stamp,)) => Ok(stamp.map(from_millis)),
        None => Err(StoreError::UnknownUser(user_id)),
    }
}
