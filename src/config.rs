//! Environment-driven configuration.
//!
//! Every setting is read once at startup (after `dotenvy` has loaded `.env`).
//! Malformed values fall back to their defaults; the fallbacks are collected
//! in [`AppConfig::warnings`] so they can be logged once tracing is up.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::jobs::history_snapshot_sync::DEFAULT_SNAPSHOT_INTERVAL_SECS;
use crate::services::key_pool::DEFAULT_KEY_COOLDOWN_SECS;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_PRICE_API_BASE_URL: &str = "PRICE_API_BASE_URL";
pub const ENV_PRICE_API_RATE_LIMIT_CODE: &str = "PRICE_API_RATE_LIMIT_CODE";
pub const ENV_PRICE_API_TIMEOUT_SECS: &str = "PRICE_API_TIMEOUT_SECS";
pub const ENV_PRICE_API_RETRIES: &str = "PRICE_API_RETRIES";
pub const ENV_PRICE_SYNC_INTERVAL_SECS: &str = "PRICE_SYNC_INTERVAL_SECS";
pub const ENV_PRICE_SYNC_PAGE_DELAY_MS: &str = "PRICE_SYNC_PAGE_DELAY_MS";
pub const ENV_KEY_COOLDOWN_SECS: &str = "KEY_COOLDOWN_SECS";
pub const ENV_HISTORY_SNAPSHOT_INTERVAL_SECS: &str = "HISTORY_SNAPSHOT_INTERVAL_SECS";
pub const ENV_PRICE_HISTORY_RETENTION_DAYS: &str = "PRICE_HISTORY_RETENTION_DAYS";
pub const ENV_API_RATE_LIMIT_WINDOW_SECS: &str = "API_RATE_LIMIT_WINDOW_SECS";
pub const ENV_API_RATE_LIMIT_MAX_REQUESTS: &str = "API_RATE_LIMIT_MAX_REQUESTS";
pub const ENV_SESSION_TTL_SECS: &str = "SESSION_TTL_SECS";
pub const ENV_ALERT_COOLDOWN_SECS: &str = "ALERT_COOLDOWN_SECS";
pub const ENV_ALERT_MAX_PER_MINUTE: &str = "ALERT_MAX_PER_MINUTE";
pub const ENV_ALERT_BATCH_WINDOW_SECS: &str = "ALERT_BATCH_WINDOW_SECS";
pub const ENV_ALERT_WEBHOOK_URL: &str = "ALERT_WEBHOOK_URL";

/// Auth tokens live 7 days; the session version outlives them by an hour
const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 3600 + 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub price_api_base_url: String,
    pub price_api_rate_limit_code: i64,
    pub price_api_timeout: Duration,
    pub price_api_retries: u32,
    pub price_sync_interval: Duration,
    pub price_sync_page_delay: Duration,
    pub key_cooldown_secs: i64,
    pub history_snapshot_interval: Duration,
    pub history_retention_days: i64,
    pub api_rate_limit_window: Duration,
    pub api_rate_limit_max_requests: u64,
    pub session_ttl: Duration,
    pub alert_cooldown_secs: i64,
    pub alert_max_per_minute: usize,
    /// 0 disables batching
    pub alert_batch_window_secs: i64,
    pub alert_webhook_url: Option<String>,
    pub warnings: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let mut parse = |name: &'static str, default: u64| -> u64 {
            parsed_or(&lookup, name, default, &mut warnings)
        };

        let price_api_timeout = Duration::from_secs(parse(ENV_PRICE_API_TIMEOUT_SECS, 90));
        let price_api_retries = parse(ENV_PRICE_API_RETRIES, 2) as u32;
        let price_sync_interval = Duration::from_secs(parse(ENV_PRICE_SYNC_INTERVAL_SECS, 600));
        let price_sync_page_delay = Duration::from_millis(parse(ENV_PRICE_SYNC_PAGE_DELAY_MS, 2000));
        let key_cooldown_secs = parse(ENV_KEY_COOLDOWN_SECS, DEFAULT_KEY_COOLDOWN_SECS as u64) as i64;
        let history_snapshot_interval =
            Duration::from_secs(parse(ENV_HISTORY_SNAPSHOT_INTERVAL_SECS, DEFAULT_SNAPSHOT_INTERVAL_SECS));
        let history_retention_days = parse(ENV_PRICE_HISTORY_RETENTION_DAYS, 180) as i64;
        let api_rate_limit_window = Duration::from_secs(parse(ENV_API_RATE_LIMIT_WINDOW_SECS, 60));
        let api_rate_limit_max_requests = parse(ENV_API_RATE_LIMIT_MAX_REQUESTS, 120);
        let session_ttl = Duration::from_secs(parse(ENV_SESSION_TTL_SECS, DEFAULT_SESSION_TTL_SECS));
        let alert_cooldown_secs = parse(ENV_ALERT_COOLDOWN_SECS, 300) as i64;
        let alert_max_per_minute = parse(ENV_ALERT_MAX_PER_MINUTE, 10) as usize;
        let alert_batch_window_secs = parse(ENV_ALERT_BATCH_WINDOW_SECS, 0) as i64;

        let price_api_rate_limit_code = match lookup(ENV_PRICE_API_RATE_LIMIT_CODE) {
            None => 4005,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warnings.push(format!(
                    "{} has invalid value {:?}, using 4005",
                    ENV_PRICE_API_RATE_LIMIT_CODE, raw
                ));
                4005
            }),
        };

        Ok(Self {
            database_url: lookup(ENV_DATABASE_URL).ok_or(ConfigError::Missing(ENV_DATABASE_URL))?,
            bind_addr: lookup(ENV_BIND_ADDR).unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            price_api_base_url: lookup(ENV_PRICE_API_BASE_URL)
                .unwrap_or_else(|| "https://open.steamdt.com".to_string()),
            price_api_rate_limit_code,
            price_api_timeout,
            price_api_retries,
            price_sync_interval,
            price_sync_page_delay,
            key_cooldown_secs,
            history_snapshot_interval,
            history_retention_days,
            api_rate_limit_window,
            api_rate_limit_max_requests,
            session_ttl,
            alert_cooldown_secs,
            alert_max_per_minute,
            alert_batch_window_secs,
            alert_webhook_url: lookup(ENV_ALERT_WEBHOOK_URL).filter(|url| !url.trim().is_empty()),
            warnings,
        })
    }
}

fn parsed_or<F, T>(lookup: &F, name: &str, default: T, warnings: &mut Vec<String>) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(name) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warnings.push(format!("{} has invalid value {:?}, using {}", name, raw, default));
                default
            }
        },
    }
}
