use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Channels
    pub channels_config_path: PathBuf,

    // Database
    pub database_path: PathBuf,

    // Monitoring
    pub check_interval: Duration,
    pub channel_concurrency: usize,
    pub baseline_policy: BaselinePolicy,

    // Fetching
    pub base_url: String,
    pub fetch_timeout: Duration,
    pub fallback_timeout: Duration,
    pub rate_limit_backoff: Duration,

    // Notifications
    pub notify_webhook_url: Option<String>,
}

/// What to do the first time a channel is observed with no stored post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselinePolicy {
    /// Treat the first observed post as new and notify every watcher.
    Notify,
    /// Store the first observed post without notifying.
    Silent,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Channels
            channels_config_path: PathBuf::from(env_or_default(
                "CHANNELS_CONFIG_PATH",
                "./config/channels.json",
            )),

            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/watcher.sqlite")),

            // Monitoring
            check_interval: Duration::from_secs(parse_env_u64("CHECK_INTERVAL_MINUTES", 10)? * 60),
            channel_concurrency: parse_env_usize("CHANNEL_CONCURRENCY", 2)?,
            baseline_policy: parse_baseline_policy(&env_or_default("BASELINE_POLICY", "notify"))?,

            // Fetching
            base_url: env_or_default("YOUTUBE_BASE_URL", DEFAULT_BASE_URL),
            fetch_timeout: Duration::from_secs(parse_env_u64("FETCH_TIMEOUT_SECS", 30)?),
            fallback_timeout: Duration::from_secs(parse_env_u64("FALLBACK_TIMEOUT_SECS", 15)?),
            rate_limit_backoff: Duration::from_secs(parse_env_u64("RATE_LIMIT_BACKOFF_SECS", 5)?),

            // Notifications
            notify_webhook_url: optional_env("NOTIFY_WEBHOOK_URL"),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "CHECK_INTERVAL_MINUTES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.channel_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "CHANNEL_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FETCH_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.fallback_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FALLBACK_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if let Err(e) = url::Url::parse(&self.base_url) {
            return Err(ConfigError::InvalidValue {
                name: "YOUTUBE_BASE_URL".to_string(),
                message: e.to_string(),
            });
        }
        if let Some(webhook) = &self.notify_webhook_url {
            if let Err(e) = url::Url::parse(webhook) {
                return Err(ConfigError::InvalidValue {
                    name: "NOTIFY_WEBHOOK_URL".to_string(),
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Configuration suitable for tests: short timeouts, no back-off, no webhook.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            channels_config_path: PathBuf::from("./config/channels.json"),
            database_path: PathBuf::from("./data/test.sqlite"),
            check_interval: Duration::from_secs(60),
            channel_concurrency: 2,
            baseline_policy: BaselinePolicy::Notify,
            base_url: DEFAULT_BASE_URL.to_string(),
            fetch_timeout: Duration::from_secs(5),
            fallback_timeout: Duration::from_secs(5),
            rate_limit_backoff: Duration::ZERO,
            notify_webhook_url: None,
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_baseline_policy(value: &str) -> Result<BaselinePolicy, ConfigError> {
    match value.to_lowercase().as_str() {
        "notify" => Ok(BaselinePolicy::Notify),
        "silent" => Ok(BaselinePolicy::Silent),
        _ => Err(ConfigError::InvalidValue {
            name: "BASELINE_POLICY".to_string(),
            message: format!("must be 'notify' or 'silent', got '{value}'"),
        }),
    }
}
