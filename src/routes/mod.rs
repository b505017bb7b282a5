pub mod canvas;
pub mod channel;
pub mod health;
pub mod mail;
pub mod page;
pub mod user;

use chrono::Duration;

use crate::{
    AppState,
    config::FailurePolicy,
    error::AppError,
    limits::{Action, Quota, Subject},
};

/// Charges `action` to `subject` under the configured rule.
///
/// A store failure is rejected or waved through according to the action's
/// [`FailurePolicy`].
pub(crate) async fn enforce_quota(
    state: &AppState,
    subject: &Subject,
    action: Action,
) -> Result<(), AppError> {
    let rule = state.config.quotas.rule(action);

    match state.quotas.try_consume(subject, action, rule.quota).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::debug!(%subject, %action, "quota exhausted");
            let retry_at = match state.quotas.counter(subject, action).await {
                Ok(counter) => counter.map(|c| c.window_start + rule.quota.window()),
                Err(_) => None,
            };
            Err(AppError::RateLimited {
                message: denied_message(action, rule.quota),
                retry_at,
            })
        }
        Err(e) => match rule.on_store_error {
            FailurePolicy::Closed => Err(e.into()),
            FailurePolicy::Open => {
                tracing::warn!(%subject, %action, error = %e, "quota check failed, allowing request");
                Ok(())
            }
        },
    }
}

fn denied_message(action: Action, quota: Quota) -> String {
    let limit = quota.limit();
    let per = describe_window(quota.window());
    match action {
        Action::Register => format!("Too many registrations from this IP, max {limit} per {per}"),
        Action::CreateChannel => format!("You can only create {limit} channels per {per}"),
        Action::PostMessage => format!("You can only post {limit} messages per {per}"),
        Action::SendMail => format!("You can only send {limit} mail per {per}"),
        Action::UpdatePage => format!("You can only update your page {limit} times per {per}"),
    }
}

pub(crate) fn describe_window(window: Duration) -> String {
    if window == Duration::days(1) {
        "day".to_string()
    } else if window == Duration::hours(1) {
        "hour".to_string()
    } else {
        format!("{} seconds", window.num_seconds())
    }
}

/// Resolves an optional `limit` query parameter into `1..=max`.
pub(crate) fn page_limit(limit: Option<i64>, default: i64, max: i64) -> Result<i64, AppError> {
    match limit {
        None => Ok(default),
        Some(n) if (1..=max).contains(&n) => Ok(n),
        Some(_) => Err(AppError::Validation(format!("limit must be between 1 and {max}"))),
    }
}

/// Resolves an optional `offset` query parameter; negative offsets are rejected.
pub(crate) fn page_offset(offset: Option<i64>) -> Result<i64, AppError> {
    match offset {
        None => Ok(0),
        Some(n) if n >= 0 => Ok(n),
        Some(_) => Err(AppError::Validation("offset must not be negative".to_string())),
    }
}
