//! Configuration Module
//!
//! TOML-based configuration with support for:
//! - Logging level
//! - MQTT session parameters (keepalive, connect timeout)
//! - Topic namespace
//! - Environment variable overrides (EDGEMUX_* prefix)

use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
mod tests;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parse error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// MQTT session configuration
    pub mqtt: MqttConfig,
    /// Topic naming configuration
    pub topics: TopicConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// MQTT session configuration.
///
/// Applied at dial time; every owner of one connection shares these.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Keep alive interval
    #[serde(with = "humantime_serde", default = "default_keepalive")]
    pub keepalive: Duration,
    /// TCP connect timeout
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Capacity of the per-session transport event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_keepalive() -> Duration {
    Duration::from_secs(25)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_event_channel_capacity() -> usize {
    64
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            keepalive: default_keepalive(),
            connect_timeout: default_connect_timeout(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Topic naming configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Namespace prefix for device data topics
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "connio".to_string()
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        let settings = config::Config::builder()
            .add_source(File::from_str(&content, FileFormat::Toml))
            .add_source(Environment::with_prefix("EDGEMUX").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a string (no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.log.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "invalid log level: {}",
                self.log.level
            )));
        }
        if self.mqtt.keepalive.is_zero() {
            return Err(ConfigError::Validation(
                "keepalive must be non-zero".to_string(),
            ));
        }
        if self.mqtt.connect_timeout < self.mqtt.keepalive {
            return Err(ConfigError::Validation(
                "connect_timeout must be at least the keepalive interval".to_string(),
            ));
        }
        if self.mqtt.event_channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_channel_capacity must be non-zero".to_string(),
            ));
        }
        if self.topics.namespace.is_empty() || self.topics.namespace.contains('/') {
            return Err(ConfigError::Validation(format!(
                "invalid topic namespace: {:?}",
                self.topics.namespace
            )));
        }
        Ok(())
    }
}

/// Install a global tracing subscriber honoring `RUST_LOG` when set,
/// falling back to the configured level. Safe to call more than once.
pub fn init_logging(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
