use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::QuotaError;

/// Every quota-gated operation in the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Register,
    CreateChannel,
    PostMessage,
    SendMail,
    UpdatePage,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Register,
        Action::CreateChannel,
        Action::PostMessage,
        Action::SendMail,
        Action::UpdatePage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Register => "register",
            Action::CreateChannel => "create_channel",
            Action::PostMessage => "post_message",
            Action::SendMail => "send_mail",
            Action::UpdatePage => "update_page",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a counter is charged to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Ip(String),
    User(i64),
}

impl Subject {
    pub fn ip(addr: impl AsRef<str>) -> Result<Self, QuotaError> {
        let addr = addr.as_ref().trim();
        if addr.is_empty() {
            return Err(QuotaError::EmptySubject);
        }
        Ok(Subject::Ip(addr.to_string()))
    }

    pub fn user(id: i64) -> Self {
        Subject::User(id)
    }

    /// Storage key; the prefix keeps IP and user counters apart.
    pub fn key(&self) -> String {
        match self {
            Subject::Ip(addr) => format!("ip:{addr}"),
            Subject::User(id) => format!("user:{id}"),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// A limit of `limit` actions per fixed `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    limit: u32,
    window: Duration,
}

impl Quota {
    pub fn new(limit: u32, window: Duration) -> Result<Self, QuotaError> {
        if limit == 0 {
            return Err(QuotaError::ZeroLimit);
        }
        if window <= Duration::zero() {
            return Err(QuotaError::EmptyWindow);
        }
        Ok(Self { limit, window })
    }

    /// Like [`Quota::new`] but bumps degenerate values to the smallest valid
    /// ones; meant for built-in defaults.
    pub fn clamped(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window: window.max(Duration::milliseconds(1)),
        }
    }

    pub fn per_hour(limit: u32) -> Result<Self, QuotaError> {
        Self::new(limit, Duration::hours(1))
    }

    pub fn per_day(limit: u32) -> Result<Self, QuotaError> {
        Self::new(limit, Duration::days(1))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
