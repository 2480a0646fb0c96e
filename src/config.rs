//! # Bot Configuration Module
//!
//! This module defines configuration structures for the bot, the listing pipeline
//! and the history retention policy, and loads them from the environment.

use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeDelta, Utc};

use crate::errors::ConfigError;

// Defaults used when the corresponding environment variable is absent
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_HISTORY_MAX_PER_USER: usize = 200;
/// Largest accepted age limit, about a century
pub const MAX_HISTORY_AGE_DAYS: i64 = 36_500;
pub const DEFAULT_HISTORY_MAX_AGE_DAYS: i64 = 30;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_PARALLEL_SUBSCRIBERS: usize = 4;
pub const DEFAULT_KUFAR_API_URL: &str =
    "https://api.kufar.by/search-api/v2/search/rendered-paginated";
pub const DEFAULT_KUFAR_CITY: &str = "minsk";
pub const DEFAULT_KUFAR_PAGE_SIZE: u32 = 30;
pub const DEFAULT_NOTIFICATION_LANGUAGE: &str = "ru";

/// Which store implementation backs subscribers, filters and history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store, state is lost on restart
    Memory,
}

/// Retention policy for delivered-listing history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Keep at most this many most-recent rows per user
    pub max_per_user: Option<usize>,
    /// Drop rows older than this many days
    pub max_age_days: Option<i64>,
}

impl RetentionPolicy {
    /// Rows seen before this instant are dropped by the age rule
    pub fn age_cutoff(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let Some(days) = self.max_age_days else {
            return Ok(None);
        };
        TimeDelta::try_days(days)
            .and_then(|age| now.checked_sub_signed(age))
            .map(Some)
            .ok_or_else(|| anyhow!("History age limit of {days} days is out of range"))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_per_user: Some(DEFAULT_HISTORY_MAX_PER_USER),
            max_age_days: Some(DEFAULT_HISTORY_MAX_AGE_DAYS),
        }
    }
}

/// Search parameters sent to the listing source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub api_url: String,
    /// Locality slug, e.g. "minsk"
    pub city: String,
    pub page_size: u32,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_KUFAR_API_URL.to_string(),
            city: DEFAULT_KUFAR_CITY.to_string(),
            page_size: DEFAULT_KUFAR_PAGE_SIZE,
        }
    }
}

/// Listing pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub query: SearchQuery,
    pub retention: RetentionPolicy,
    /// Upper bound on a single fetch
    pub fetch_timeout: Duration,
    /// Upper bound on a single outbound message
    pub send_timeout: Duration,
    /// Subscribers processed concurrently within one tick
    pub max_parallel_subscribers: usize,
    /// Language of listing notifications
    pub notification_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            query: SearchQuery::default(),
            retention: RetentionPolicy::default(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECS),
            max_parallel_subscribers: DEFAULT_MAX_PARALLEL_SUBSCRIBERS,
            notification_language: DEFAULT_NOTIFICATION_LANGUAGE.to_string(),
        }
    }
}

/// Top-level configuration for the bot process
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_bot_token: String,
    pub store_backend: StoreBackend,
    /// Required when `store_backend` is `Postgres`
    pub database_url: Option<String>,
    pub check_interval: Duration,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
    pub pipeline: PipelineConfig,
}

impl BotConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let telegram_bot_token =
            get("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;

        let store_backend = match get("STORE_BACKEND").as_deref().map(str::trim) {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "STORE_BACKEND",
                    value: other.to_string(),
                    reason: "expected 'postgres' or 'memory'".to_string(),
                })
            }
        };

        let database_url = get("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let check_interval_secs: u64 =
            parse_var(&get, "CHECK_INTERVAL_SECS", DEFAULT_CHECK_INTERVAL_SECS)?;
        if check_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "CHECK_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }

        // 0 disables the corresponding retention rule
        let max_per_user: usize =
            parse_var(&get, "HISTORY_MAX_PER_USER", DEFAULT_HISTORY_MAX_PER_USER)?;
        let max_age_days: i64 =
            parse_var(&get, "HISTORY_MAX_AGE_DAYS", DEFAULT_HISTORY_MAX_AGE_DAYS)?;
        if max_age_days > MAX_HISTORY_AGE_DAYS {
            return Err(ConfigError::Invalid {
                name: "HISTORY_MAX_AGE_DAYS",
                value: max_age_days.to_string(),
                reason: format!("must not exceed {MAX_HISTORY_AGE_DAYS}"),
            });
        }

        let page_size: u32 = parse_var(&get, "KUFAR_PAGE_SIZE", DEFAULT_KUFAR_PAGE_SIZE)?;
        // A cap below the page size forgets listings still on the page, which are then resent
        if max_per_user > 0 && max_per_user < page_size as usize {
            return Err(ConfigError::Invalid {
                name: "HISTORY_MAX_PER_USER",
                value: max_per_user.to_string(),
                reason: format!("must be 0 or at least KUFAR_PAGE_SIZE ({page_size})"),
            });
        }

        let pipeline = PipelineConfig {
            query: SearchQuery {
                api_url: get("KUFAR_API_URL").unwrap_or_else(|| DEFAULT_KUFAR_API_URL.to_string()),
                city: get("KUFAR_CITY").unwrap_or_else(|| DEFAULT_KUFAR_CITY.to_string()),
                page_size,
            },
            retention: RetentionPolicy {
                max_per_user: (max_per_user > 0).then_some(max_per_user),
                max_age_days: (max_age_days > 0).then_some(max_age_days),
            },
            fetch_timeout: Duration::from_secs(parse_var(
                &get,
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
            send_timeout: Duration::from_secs(parse_var(
                &get,
                "SEND_TIMEOUT_SECS",
                DEFAULT_SEND_TIMEOUT_SECS,
            )?),
            max_parallel_subscribers: parse_var(
                &get,
                "MAX_PARALLEL_SUBSCRIBERS",
                DEFAULT_MAX_PARALLEL_SUBSCRIBERS,
            )?
            .max(1),
            notification_language: get("NOTIFICATION_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_NOTIFICATION_LANGUAGE.to_string()),
        };

        Ok(Self {
            telegram_bot_token,
            store_backend,
            database_url,
            check_interval: Duration::from_secs(check_interval_secs),
            json_logs: get("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            pipeline,
        })
    }
}

fn parse_var<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&'static str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
