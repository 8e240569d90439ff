//! Configuration management for storebridge
//!
//! Configuration comes from defaults, a TOML file, or `STOREBRIDGE_*`
//! environment variables, and is validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::core_gateway::CHANGE_EVENT;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Owner-side gateway configuration
    pub gateway: GatewayConfig,

    /// Bundled storage backend configuration
    pub storage: StorageConfig,

    /// Client-side proxy configuration
    pub proxy: ProxyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Quiet period after the last raw change before a change event is published
    #[serde(with = "humantime_serde")]
    pub debounce_delay: Duration,

    /// Seed the telemetry identity keys during initialization
    pub seed_identity: bool,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Buffer size of the raw storage change stream. A gateway that falls
    /// behind it republishes the whole store.
    pub change_channel_capacity: usize,
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Name of the remote change event to subscribe to
    pub change_event: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            debounce_delay: Duration::from_millis(100),
            seed_identity: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            change_channel_capacity: 1024,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            change_event: CHANGE_EVENT.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: STOREBRIDGE_<SECTION>_<KEY>
    /// Example: STOREBRIDGE_GATEWAY_DEBOUNCE_DELAY=250ms
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Gateway config
        if let Ok(delay) = env::var("STOREBRIDGE_GATEWAY_DEBOUNCE_DELAY") {
            config.gateway.debounce_delay = humantime_serde::re::humantime::parse_duration(&delay)
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid debounce delay: {}", e)))?;
        }
        if let Ok(seed) = env::var("STOREBRIDGE_GATEWAY_SEED_IDENTITY") {
            config.gateway.seed_identity = seed
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid seed flag: {}", e)))?;
        }

        // Storage config
        if let Ok(capacity) = env::var("STOREBRIDGE_STORAGE_CHANGE_CHANNEL_CAPACITY") {
            config.storage.change_channel_capacity = capacity.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid change channel capacity: {}", e))
            })?;
        }

        // Proxy config
        if let Ok(event) = env::var("STOREBRIDGE_PROXY_CHANGE_EVENT") {
            config.proxy.change_event = event;
        }

        // Logging config
        if let Ok(level) = env::var("STOREBRIDGE_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("STOREBRIDGE_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gateway.debounce_delay.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "debounce_delay must be greater than 0".to_string(),
            ));
        }

        if self.storage.change_channel_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "change_channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.proxy.change_event.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "change_event must not be empty".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.debounce_delay, Duration::from_millis(100));
        assert_eq!(config.proxy.change_event, "onDidChangeItems");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.gateway.debounce_delay = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.storage.change_channel_capacity = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.proxy.change_event.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storebridge.toml");

        let mut config = Config::default();
        config.gateway.debounce_delay = Duration::from_millis(250);
        config.storage.change_channel_capacity = 64;
        config.logging.level = "debug".to_string();
        config.save_to_file(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[storage]"));

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.gateway.debounce_delay, Duration::from_millis(250));
        assert_eq!(loaded.storage.change_channel_capacity, 64);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[gateway]\ndebounce_delay = \"2s\"\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.gateway.debounce_delay, Duration::from_secs(2));
        assert_eq!(loaded.storage.change_channel_capacity, 1024);
        assert_eq!(loaded.logging.level, "info");
    }

    #[test]
    fn test_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "gateway = [").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
