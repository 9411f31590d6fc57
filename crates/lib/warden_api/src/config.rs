//! API server configuration.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use tracing::warn;
use warden_core::auth::jwt::{
    ACCESS_TOKEN_EXPIRY_MINUTES, REFRESH_TOKEN_EXPIRY_DAYS, TokenConfig, resolve_jwt_secret,
};
use warden_core::auth::lockout::{LOCKOUT_DURATION_MINUTES, LockoutPolicy, MAX_FAILED_ATTEMPTS};

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub max_failed_attempts: i32,
    pub lockout_duration_minutes: i64,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("access_token_ttl_minutes", &self.access_token_ttl_minutes)
            .field("refresh_token_ttl_days", &self.refresh_token_ttl_days)
            .field("max_failed_attempts", &self.max_failed_attempts)
            .field("lockout_duration_minutes", &self.lockout_duration_minutes)
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    /// Configuration with default lifetimes and limits around `jwt_secret`.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            pg_connection_url: "postgres://localhost:5432/warden".into(),
            jwt_secret: jwt_secret.into(),
            access_token_ttl_minutes: ACCESS_TOKEN_EXPIRY_MINUTES,
            refresh_token_ttl_days: REFRESH_TOKEN_EXPIRY_DAYS,
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
            lockout_duration_minutes: LOCKOUT_DURATION_MINUTES,
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                   | Default                            |
    /// |----------------------------|------------------------------------|
    /// | `BIND_ADDR`                | `127.0.0.1:3100`                   |
    /// | `DATABASE_URL`             | `postgres://localhost:5432/warden` |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file    |
    /// | `ACCESS_TOKEN_TTL_MINUTES` | `30`                               |
    /// | `REFRESH_TOKEN_TTL_DAYS`   | `7`                                |
    /// | `MAX_FAILED_ATTEMPTS`      | `5`                                |
    /// | `LOCKOUT_DURATION_MINUTES` | `15`                               |
    ///
    /// Lifetimes and limits must be positive, and a lifetime must fit on the
    /// calendar when added to the current time; anything else falls back to
    /// the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::with_secret(String::new());
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or(defaults.pg_connection_url),
            jwt_secret: resolve_jwt_secret(),
            access_token_ttl_minutes: checked_span(
                "ACCESS_TOKEN_TTL_MINUTES",
                env_or("ACCESS_TOKEN_TTL_MINUTES", defaults.access_token_ttl_minutes),
                defaults.access_token_ttl_minutes,
                Duration::try_minutes,
            ),
            refresh_token_ttl_days: checked_span(
                "REFRESH_TOKEN_TTL_DAYS",
                env_or("REFRESH_TOKEN_TTL_DAYS", defaults.refresh_token_ttl_days),
                defaults.refresh_token_ttl_days,
                Duration::try_days,
            ),
            max_failed_attempts: checked_limit(
                "MAX_FAILED_ATTEMPTS",
                env_or("MAX_FAILED_ATTEMPTS", defaults.max_failed_attempts),
                defaults.max_failed_attempts,
            ),
            lockout_duration_minutes: checked_span(
                "LOCKOUT_DURATION_MINUTES",
                env_or("LOCKOUT_DURATION_MINUTES", defaults.lockout_duration_minutes),
                defaults.lockout_duration_minutes,
                Duration::try_minutes,
            ),
        }
    }

    /// Token lifetimes. Values that are not usable lifetimes are replaced by
    /// the defaults.
    pub fn token_config(&self) -> TokenConfig {
        let defaults = TokenConfig::default();
        TokenConfig {
            access_ttl: usable_span(self.access_token_ttl_minutes, Duration::try_minutes)
                .unwrap_or(defaults.access_ttl),
            refresh_ttl: usable_span(self.refresh_token_ttl_days, Duration::try_days)
                .unwrap_or(defaults.refresh_ttl),
            ..defaults
        }
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        let defaults = LockoutPolicy::default();
        LockoutPolicy {
            max_failed_attempts: if self.max_failed_attempts > 0 {
                self.max_failed_attempts
            } else {
                defaults.max_failed_attempts
            },
            lockout_duration: usable_span(self.lockout_duration_minutes, Duration::try_minutes)
                .unwrap_or(defaults.lockout_duration),
        }
    }
}

/// `count` units of `unit` as a duration, if positive and small enough to be
/// added to the current time.
fn usable_span(count: i64, unit: fn(i64) -> Option<Duration>) -> Option<Duration> {
    if count <= 0 {
        return None;
    }
    let span = unit(count)?;
    Utc::now().checked_add_signed(span)?;
    Some(span)
}

fn checked_span(key: &str, count: i64, default: i64, unit: fn(i64) -> Option<Duration>) -> i64 {
    if usable_span(count, unit).is_some() {
        return count;
    }
    warn!(key, value = count, default, "ignoring out-of-range setting");
    default
}

fn checked_limit(key: &str, limit: i32, default: i32) -> i32 {
    if limit > 0 {
        return limit;
    }
    warn!(key, value = limit, default, "ignoring non-positive setting");
    default
}

/// Parse `key` from the environment, falling back to `default` when unset or
/// unparseable.
fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable setting");
            default
        }),
        Err(_) => default,
    }
}
