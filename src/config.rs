//! Configuration for the user service
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! environment variables. Environment overrides that are empty or fail to
//! parse leave the previous value in place.

use crate::broker::connection::BrokerConfig;
use crate::broker::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Files probed when no config path is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["user-service.toml", "config/user-service.toml"];

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub http: HttpSection,
    pub amqp: BrokerConfig,
}

/// HTTP server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpSection {
    /// Listen address; a leading `:` binds all interfaces
    pub url: String,
    /// Time allowed for in-flight requests to drain on shutdown
    pub shutdown_timeout_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            url: "0.0.0.0:4000".to_string(),
            shutdown_timeout_ms: 5000,
        }
    }
}

impl HttpSection {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Resolve `url` to a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let url = self.url.trim();
        let candidate = if url.starts_with(':') {
            format!("0.0.0.0{url}")
        } else {
            url.to_string()
        };
        candidate
            .parse()
            .map_err(|_| ConfigError::InvalidConfig(format!("Invalid HTTP listen address '{url}'")))
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ServiceConfig {
    /// Load defaults, then `path` (or the first default path that exists),
    /// then environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path.map(Path::to_path_buf).or_else(find_default_config) {
            Some(path) => Self::load_from_file(&path)?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get("HTTP_SERVER_URL") {
            self.http.url = url;
        }
        if let Some(timeout) =
            get("HTTP_SHUTDOWN_TIMEOUT").and_then(|v| parse_env_duration("HTTP_SHUTDOWN_TIMEOUT", &v))
        {
            self.http.shutdown_timeout_ms = millis(timeout);
        }

        if let Some(host) = get("AMQP_HOST") {
            self.amqp.host = host;
        }
        if let Some(port) = get("AMQP_PORT").and_then(|v| parse_env_number("AMQP_PORT", &v)) {
            self.amqp.port = port;
        }
        if let Some(username) = get("AMQP_USERNAME") {
            self.amqp.username = username;
        }
        if let Some(password) = get("AMQP_PASSWORD") {
            self.amqp.password = password;
        }
        if let Some(timeout) = get("AMQP_PUBLISH_TIMEOUT_SECONDS")
            .and_then(|v| parse_env_duration("AMQP_PUBLISH_TIMEOUT_SECONDS", &v))
        {
            self.amqp.publish_timeout_ms = millis(timeout);
        }
        if let Some(interval) = get("AMQP_CONNECTION_RETRY_INTERVAL_SECONDS")
            .and_then(|v| parse_env_duration("AMQP_CONNECTION_RETRY_INTERVAL_SECONDS", &v))
        {
            self.amqp.connection_retry_interval_ms = millis(interval);
        }
        if let Some(attempts) = get("AMQP_CONNECTION_RETRY_ATTEMPTS")
            .and_then(|v| parse_env_number("AMQP_CONNECTION_RETRY_ATTEMPTS", &v))
        {
            self.amqp.connection_retry_attempts = attempts;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.socket_addr()?;

        let amqp = &self.amqp;
        if amqp.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "amqp.host must not be empty".to_string(),
            ));
        }
        if amqp.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "amqp.port must be greater than 0".to_string(),
            ));
        }
        if amqp.publish_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "amqp.publish_timeout_ms must be greater than 0".to_string(),
            ));
        }
        RetryPolicy::from_config(amqp)
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(format!("amqp.{e}")))?;
        amqp.address()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        Ok(())
    }
}

fn find_default_config() -> Option<PathBuf> {
    DEFAULT_CONFIG_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.is_file())
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_env_number<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value, "Ignoring unparsable environment override");
            None
        }
    }
}

fn parse_env_duration(key: &str, value: &str) -> Option<Duration> {
    let parsed = parse_duration(value);
    if parsed.is_none() {
        warn!(key, value, "Ignoring unparsable environment override");
    }
    parsed
}

/// Parse `30`, `30s`, `500ms`, `2m` or `1h`. A bare number is seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "s" => Some(Duration::from_secs(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
