use std::collections::HashMap;
use std::env;

use chrono::Duration;

use crate::limits::{Action, Quota};

/// Limit applied to every action when `LIFT_RATE_LIMITS=true`.
pub const LIFTED_LIMIT: u32 = 10_000;

const DEFAULT_JWT_EXPIRATION_SECS: u64 = 720 * 3600;
const DEFAULT_EDIT_COOLDOWN_SECS: u64 = 86_400;
const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub canvas_size: u32,
    pub edit_cooldown_secs: u64,
    pub snapshot_ttl_secs: u64,
    pub image_max_age_secs: u64,
    pub quota_sweep_interval_secs: u64,
    pub quotas: QuotaPolicy,
}

impl Config {
    /// Defaults for everything except the store and the signing secret.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Config {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            server_host: "::".to_string(),
            server_port: 8080,
            api_base_uri: "/api".to_string(),
            canvas_size: 1024,
            edit_cooldown_secs: DEFAULT_EDIT_COOLDOWN_SECS,
            snapshot_ttl_secs: DEFAULT_SNAPSHOT_TTL_SECS,
            image_max_age_secs: 60,
            quota_sweep_interval_secs: 3600,
            quotas: QuotaPolicy::standard(),
        }
    }

    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let mut config = Config::new(
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:moltcities.db".to_string()),
            env::var("JWT_SECRET")?,
        );

        if let Ok(v) = env::var("JWT_EXPIRATION") {
            config.jwt_expiration_secs = v
                .trim_end_matches('h')
                .parse::<u64>()
                .ok()
                .and_then(|hours| hours.checked_mul(3600))
                .unwrap_or_else(|| {
                    tracing::warn!("Invalid JWT_EXPIRATION={:?}, using default", v);
                    DEFAULT_JWT_EXPIRATION_SECS
                });
        }
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server_host = v;
        }
        if let Ok(v) = env::var("API_BASE_URI") {
            config.api_base_uri = v;
        }
        config.server_port = parse_var("SERVER_PORT", config.server_port);
        config.canvas_size = parse_var("CANVAS_SIZE", config.canvas_size).max(1);
        config.edit_cooldown_secs = parse_var("EDIT_COOLDOWN_SECS", config.edit_cooldown_secs);
        config.snapshot_ttl_secs = parse_var("SNAPSHOT_TTL_SECS", config.snapshot_ttl_secs);
        config.image_max_age_secs = parse_var("IMAGE_MAX_AGE_SECS", config.image_max_age_secs);
        config.quota_sweep_interval_secs =
            parse_var("QUOTA_SWEEP_INTERVAL", config.quota_sweep_interval_secs).max(1);

        if env::var("LIFT_RATE_LIMITS").is_ok_and(|v| v == "true") {
            config.quotas = QuotaPolicy::lifted();
        }

        Ok(config)
    }

    pub fn jwt_expiration(&self) -> Duration {
        seconds_or_default(
            "JWT_EXPIRATION",
            self.jwt_expiration_secs,
            DEFAULT_JWT_EXPIRATION_SECS,
        )
    }

    pub fn edit_cooldown(&self) -> Duration {
        seconds_or_default(
            "EDIT_COOLDOWN_SECS",
            self.edit_cooldown_secs,
            DEFAULT_EDIT_COOLDOWN_SECS,
        )
    }

    pub fn snapshot_ttl(&self) -> Duration {
        seconds_or_default(
            "SNAPSHOT_TTL_SECS",
            self.snapshot_ttl_secs,
            DEFAULT_SNAPSHOT_TTL_SECS,
        )
    }

    pub fn quota_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.quota_sweep_interval_secs)
    }
}

/// `secs` as a [`Duration`], or `default` when it does not fit one.
fn seconds_or_default(name: &str, secs: u64, default: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| {
            tracing::warn!("{}={}s is out of range, using {}s", name, secs, default);
            Duration::seconds(default as i64)
        })
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}={:?}, using default", name, v);
            default
        }),
        Err(_) => default,
    }
}

/// What a caller does when the quota store itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the request.
    Closed,
    /// Let the request through and log it.
    Open,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaRule {
    pub quota: Quota,
    pub on_store_error: FailurePolicy,
}

/// Limit, window and failure policy for every [`Action`].
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    rules: HashMap<Action, QuotaRule>,
    lifted: bool,
}

impl QuotaPolicy {
    pub fn standard() -> Self {
        let rules = Action::ALL
            .into_iter()
            .map(|action| (action, standard_rule(action)))
            .collect();
        QuotaPolicy {
            rules,
            lifted: false,
        }
    }

    /// Standard windows and failure policies with every limit raised to
    /// [`LIFTED_LIMIT`], for bulk pre-population.
    pub fn lifted() -> Self {
        let mut policy = Self::standard();
        for rule in policy.rules.values_mut() {
            rule.quota = Quota::clamped(LIFTED_LIMIT, rule.quota.window());
        }
        policy.lifted = true;
        policy
    }

    pub fn is_lifted(&self) -> bool {
        self.lifted
    }

    pub fn rule(&self, action: Action) -> QuotaRule {
        self.rules
            .get(&action)
            .copied()
            .unwrap_or_else(|| standard_rule(action))
    }

    pub fn set(&mut self, action: Action, rule: QuotaRule) {
        self.rules.insert(action, rule);
    }

    /// Longest configured window, the floor for sweep retention.
    pub fn longest_window(&self) -> Duration {
        self.rules
            .values()
            .map(|r| r.quota.window())
            .max()
            .unwrap_or_else(|| Duration::days(1))
    }
}

fn standard_rule(action: Action) -> QuotaRule {
    let (limit, window, on_store_error) = match action {
        Action::Register => (5, Duration::days(1), FailurePolicy::Closed),
        Action::CreateChannel => (3, Duration::days(1), FailurePolicy::Open),
        Action::PostMessage => (10, Duration::hours(1), FailurePolicy::Open),
        Action::SendMail => (20, Duration::days(1), FailurePolicy::Closed),
        Action::UpdatePage => (10, Duration::days(1), FailurePolicy::Open),
    };
    QuotaRule {
        quota: Quota::clamped(limit, window),
        on_store_error,
    }
}
