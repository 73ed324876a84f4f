use {
    std::{env, fmt::Display, ops::RangeInclusive, str::FromStr, time::Duration},
    thiserror::Error,
};

/// Accepted `INTEGRITY_LOOKBACK_DAYS`, in days.
const LOOKBACK_DAYS: RangeInclusive<i64> = 1..=3_650;
/// Accepted `INTEGRITY_STALE_EVENT_MINUTES`; at most one week.
const STALE_EVENT_MINUTES: RangeInclusive<u64> = 1..=10_080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Knobs the request handlers read at runtime.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Prefix of the payment description shown on statements.
    pub statement_prefix: String,
    pub webhook_secret: String,
    /// Integrity endpoint credential. `None` rejects every caller.
    pub cron_secret: Option<String>,
    pub signed_url_ttl: Duration,
    pub integrity_lookback_days: i64,
    pub integrity_stale_after: Duration,
    pub order_rate_limit: u32,
    pub order_rate_window: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            statement_prefix: "Marketplace".to_string(),
            webhook_secret: String::new(),
            cron_secret: None,
            signed_url_ttl: Duration::from_secs(60),
            integrity_lookback_days: 7,
            integrity_stale_after: Duration::from_secs(15 * 60),
            order_rate_limit: 10,
            order_rate_window: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub bucket: String,
    pub signing_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: String,
    pub stripe_secret_key: String,
    pub storage: StorageConfig,
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Settings::default();

        let settings = Settings {
            statement_prefix: optional("STATEMENT_PREFIX").unwrap_or(defaults.statement_prefix),
            webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            cron_secret: optional("CRON_SECRET")
                .map(|s| normalize_secret(&s))
                .filter(|s| !s.is_empty()),
            signed_url_ttl: Duration::from_secs(parsed(
                "SIGNED_URL_TTL_SECS",
                defaults.signed_url_ttl.as_secs(),
            )?),
            integrity_lookback_days: within(
                "INTEGRITY_LOOKBACK_DAYS",
                parsed("INTEGRITY_LOOKBACK_DAYS", defaults.integrity_lookback_days)?,
                LOOKBACK_DAYS,
            )?,
            integrity_stale_after: stale_after(within(
                "INTEGRITY_STALE_EVENT_MINUTES",
                parsed("INTEGRITY_STALE_EVENT_MINUTES", 15)?,
                STALE_EVENT_MINUTES,
            )?)?,
            order_rate_limit: parsed("ORDER_RATE_LIMIT", defaults.order_rate_limit)?,
            order_rate_window: Duration::from_secs(parsed(
                "ORDER_RATE_WINDOW_SECS",
                defaults.order_rate_window.as_secs(),
            )?),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 20)?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            storage: StorageConfig {
                base_url: required("STORAGE_BASE_URL")?,
                bucket: optional("STORAGE_BUCKET").unwrap_or_else(|| "project-files".to_string()),
                signing_key: required("STORAGE_SIGNING_KEY")?,
            },
            settings,
        })
    }
}

/// Strips whitespace, one pair of surrounding quotes and stray newline
/// escapes that creep into secrets pasted through dashboards.
pub fn normalize_secret(value: &str) -> String {
    let trimmed = value.trim();
    let unquoted = if trimmed.len() >= 2
        && ((trimmed.starts_with('"') && trimmed.ends_with('"'))
            || (trimmed.starts_with('\'') && trimmed.ends_with('\'')))
    {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };
    unquoted
        .replace("\\n", "")
        .replace(['\r', '\n'], "")
        .trim()
        .to_string()
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

fn within<T: PartialOrd + Display>(
    name: &'static str,
    value: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError> {
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        })
    }
}

fn stale_after(minutes: u64) -> Result<Duration, ConfigError> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or(ConfigError::Invalid {
            name: "INTEGRITY_STALE_EVENT_MINUTES",
            value: minutes.to_string(),
        })
}
