//! Fixed-window quota counters persisted in `quota_counters`.
//!
//! The whole check-and-consume decision is a single conditional upsert, so
//! concurrent requests (from any number of processes sharing the store)
//! serialize on the row and can never push a counter past its limit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};

use super::action::{Action, Quota, Subject};
use super::clock::{Clock, from_millis, to_millis, window_cutoff};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCounter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

#[derive(FromRow)]
struct CounterRow {
    count: i64,
    window_start: i64,
}

impl From<CounterRow> for QuotaCounter {
    fn from(row: CounterRow) -> Self {
        QuotaCounter {
            count: u32::try_from(row.count).unwrap_or(u32::MAX),
            window_start: from_millis(row.window_start),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuotaLedger {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl QuotaLedger {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Charges one unit of `action` to `subject`.
    ///
    /// Returns `Ok(true)` when the action is allowed (and already counted),
    /// `Ok(false)` when the subject has used up `quota` in the current window.
    /// A denied call leaves the counter untouched.
    pub async fn try_consume(
        &self,
        subject: &Subject,
        action: Action,
        quota: Quota,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let cutoff = window_cutoff(now, quota.window());

        // Insert fresh, reset an elapsed window, or increment below the limit.
        // When none applies the DO UPDATE's WHERE filters the row out and
        // RETURNING yields nothing.
        let row: Option<CounterRow> = sqlx::query_as(
            r#"
            INSERT INTO quota_counters (subject, action, count, window_start)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (subject, action) DO UPDATE SET
                count = CASE WHEN quota_counters.window_start <= ?4
                             THEN 1 ELSE quota_counters.count + 1 END,
                window_start = CASE WHEN quota_counters.window_start <= ?4
                                    THEN excluded.window_start ELSE quota_counters.window_start END
            WHERE quota_counters.window_start <= ?4 OR quota_counters.count < ?5
            RETURNING count, window_start
            "#,
        )
        .bind(subject.key())
        .bind(action.as_str())
        .bind(to_millis(now))
        .bind(cutoff)
        .bind(i64::from(quota.limit()))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                tracing::trace!(%subject, %action, count = row.count, "quota consumed");
                Ok(true)
            }
            None => {
                tracing::debug!(%subject, %action, limit = quota.limit(), "quota exhausted");
                Ok(false)
            }
        }
    }

    /// Current counter for (subject, action), if one exists.
    pub async fn counter(
        &self,
        subject: &Subject,
        action: Action,
    ) -> Result<Option<QuotaCounter>, StoreError> {
        let row: Option<CounterRow> = sqlx::query_as(
            "SELECT count, window_start FROM quota_counters WHERE subject = ?1 AND action = ?2",
        )
        .bind(subject.key())
        .bind(action.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(QuotaCounter::from))
    }

    /// Deletes counters whose window started more than `retention` ago and
    /// returns how many were removed.
    ///
    /// Safe to race with `try_consume`: a swept counter is recreated fresh,
    /// which is what an elapsed window would have done anyway as long as
    /// `retention` is at least the longest window in use.
    pub async fn sweep(&self, retention: Duration) -> Result<u64, StoreError> {
        let cutoff = window_cutoff(self.clock.now(), retention);
        let result = sqlx::query("DELETE FROM quota_counters WHERE window_start < ?1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
