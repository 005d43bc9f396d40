//! # Environment-Based Configuration
//!
//! ## Environment Variables
//!
//! - `PARLEY_BROKER_URL` - Broker endpoint (default: `redis://localhost:6379`)
//! - `PARLEY_FETCH_TIMEOUT_MS` - Soft deadline for one fetch in milliseconds (default: 5000)
//! - `PARLEY_READ_LIMIT` - Messages returned by a read when no limit is given (default: 50)
//! - `PARLEY_MAX_READ_LIMIT` - Largest limit a read accepts (default: 1000)
//! - `PARLEY_CONSUMER_NAME` - Member name this process uses inside a durable reader (default: `parley`)

use std::env;
use std::time::Duration;

use crate::reader::{DEFAULT_FETCH_TIMEOUT, DEFAULT_READ_LIMIT};

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Runtime settings for the chat service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub broker_url: String,
    pub fetch_timeout: Duration,
    pub default_read_limit: usize,
    pub max_read_limit: usize,
    pub consumer_name: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            broker_url: "redis://localhost:6379".to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            default_read_limit: DEFAULT_READ_LIMIT,
            max_read_limit: 1000,
            consumer_name: "parley".to_string(),
        }
    }
}

impl ChatConfig {
    pub fn builder() -> ChatConfigBuilder {
        ChatConfigBuilder::default()
    }

    /// Load from `PARLEY_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// result fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        ChatConfigBuilder::from_lookup(|key| env::var(key).ok())?.build()
    }
}

/// Builder for [`ChatConfig`]
#[derive(Debug, Clone, Default)]
pub struct ChatConfigBuilder {
    config: ChatConfig,
}

impl ChatConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from an arbitrary key lookup (the environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(url) = lookup("PARLEY_BROKER_URL") {
            builder = builder.broker_url(url);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "PARLEY_FETCH_TIMEOUT_MS")? {
            builder = builder.fetch_timeout(Duration::from_millis(ms));
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "PARLEY_READ_LIMIT")? {
            builder = builder.default_read_limit(limit);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "PARLEY_MAX_READ_LIMIT")? {
            builder = builder.max_read_limit(limit);
        }
        if let Some(name) = lookup("PARLEY_CONSUMER_NAME") {
            builder = builder.consumer_name(name);
        }

        Ok(builder)
    }

    #[must_use]
    pub fn broker_url(mut self, url: impl Into<String>) -> Self {
        self.config.broker_url = url.into();
        self
    }

    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn default_read_limit(mut self, limit: usize) -> Self {
        self.config.default_read_limit = limit;
        self
    }

    #[must_use]
    pub fn max_read_limit(mut self, limit: usize) -> Self {
        self.config.max_read_limit = limit;
        self
    }

    #[must_use]
    pub fn consumer_name(mut self, name: impl Into<String>) -> Self {
        self.config.consumer_name = name.into();
        self
    }

    /// Validate and produce the configuration
    pub fn build(self) -> Result<ChatConfig, ConfigError> {
        let config = self.config;

        if config.broker_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "broker URL cannot be empty".to_string(),
            ));
        }
        if config.fetch_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }
        if config.default_read_limit == 0 || config.default_read_limit > config.max_read_limit {
            return Err(ConfigError::ValidationError(format!(
                "default read limit {} must be between 1 and {}",
                config.default_read_limit, config.max_read_limit
            )));
        }
        if config.consumer_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "consumer name cannot be empty".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid value '{val}': {e}"),
            }),
        None => Ok(None),
    }
}
