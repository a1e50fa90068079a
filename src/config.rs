use crate::domain::Decimal;
use crate::engine::FraudThresholds;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Buyer cashback percentage used when the program cannot be loaded.
    pub default_buyer_cashback_rate: Decimal,
    pub fraud: FraudThresholds,
    pub event_bus_capacity: usize,
    /// When set, notifications are POSTed here as JSON instead of logged.
    pub notify_webhook_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or::<u16>(&env_map, "PORT", "8080", "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let default_buyer_cashback_rate = parse_or::<Decimal>(
            &env_map,
            "DEFAULT_BUYER_CASHBACK_RATE",
            "10",
            "must be a decimal percentage",
        )?;
        if default_buyer_cashback_rate.is_negative()
            || default_buyer_cashback_rate > Decimal::hundred()
        {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_BUYER_CASHBACK_RATE".to_string(),
                "must be between 0 and 100".to_string(),
            ));
        }

        let defaults = FraudThresholds::default();
        let fraud = FraudThresholds {
            click_spam_threshold: parse_or(
                &env_map,
                "CLICK_SPAM_THRESHOLD",
                &defaults.click_spam_threshold.to_string(),
                "must be a valid i64",
            )?,
            click_spam_window_ms: parse_or(
                &env_map,
                "CLICK_SPAM_WINDOW_MS",
                &defaults.click_spam_window_ms.to_string(),
                "must be a valid i64",
            )?,
            rapid_conversion_threshold: parse_or(
                &env_map,
                "RAPID_CONVERSION_THRESHOLD",
                &defaults.rapid_conversion_threshold.to_string(),
                "must be a valid i64",
            )?,
            rapid_conversion_window_ms: parse_or(
                &env_map,
                "RAPID_CONVERSION_WINDOW_MS",
                &defaults.rapid_conversion_window_ms.to_string(),
                "must be a valid i64",
            )?,
        };

        let event_bus_capacity = parse_or::<usize>(
            &env_map,
            "EVENT_BUS_CAPACITY",
            "1024",
            "must be a positive integer",
        )?;
        if event_bus_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "EVENT_BUS_CAPACITY".to_string(),
                "must be a positive integer".to_string(),
            ));
        }

        let notify_webhook_url = env_map
            .get("NOTIFY_WEBHOOK_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Config {
            port,
            database_path,
            default_buyer_cashback_rate,
            fraud,
            event_bus_capacity,
            notify_webhook_url,
        })
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string()))
}
