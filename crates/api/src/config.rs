//! Server configuration

use std::fmt;

use storefront_payments::{EmailConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_TOLERANCE_SECS};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// API server configuration, read from the environment
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// `whsec_` shared secret for payment webhooks
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub run_migrations: bool,
    pub notification_queue_capacity: usize,
    pub email: EmailConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            webhook_secret: required("PAYMENT_WEBHOOK_SECRET")?,
            webhook_tolerance_secs: parse_or(
                &lookup,
                "WEBHOOK_TOLERANCE_SECS",
                DEFAULT_TOLERANCE_SECS,
            )?,
            run_migrations: parse_bool_or(&lookup, "RUN_MIGRATIONS", true)?,
            notification_queue_capacity: parse_or(
                &lookup,
                "NOTIFICATION_QUEUE_CAPACITY",
                DEFAULT_QUEUE_CAPACITY,
            )?,
            email: EmailConfig::from_lookup(&lookup),
        })
    }
}

// Keep secrets out of logs
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("run_migrations", &self.run_migrations)
            .field(
                "notification_queue_capacity",
                &self.notification_queue_capacity,
            )
            .field("email_enabled", &self.email.api_key.is_some())
            .finish_non_exhaustive()
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool_or(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected true or false, got '{}'", other),
        }),
    }
}
