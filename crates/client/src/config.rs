//! Configuration for the gost-tpm client.
//!
//! TOML file at `~/.config/gost-tpm/config.toml` by default. Every field
//! has a default, so an absent file or a partial one is fine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tpm_protocol::{MaxBuffer, HEADER_SIZE, MAX_FRAME_SIZE};

use crate::transport::DEFAULT_DEVICE_PATH;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("device path must not be empty")]
    EmptyDevicePath,

    #[error("max_response_size must be between {min} and {max}, got {value}")]
    InvalidMaxResponseSize { value: usize, min: usize, max: usize },

    #[error("chunk_size must be between 1 and {max}, got {value}")]
    InvalidChunkSize { value: usize, max: usize },

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest response buffer the client will accept.
const MAX_RESPONSE_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
    pub hashing: HashingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Character device to open.
    pub path: PathBuf,

    /// Upper bound on a response buffer, in bytes.
    pub max_response_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HashingConfig {
    /// Piece size for interruptible hashing.
    pub chunk_size: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DEVICE_PATH),
            max_response_size: MAX_FRAME_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            chunk_size: MaxBuffer::MAX_SIZE,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gost-tpm")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides.
    ///
    /// - GOST_TPM_DEVICE: device path
    /// - GOST_TPM_LOG_LEVEL: log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(device) = std::env::var("GOST_TPM_DEVICE") {
            if !device.is_empty() {
                tracing::info!("Overriding device path from environment: {}", device);
                self.device.path = PathBuf::from(device);
            }
        }

        if let Ok(level) = std::env::var("GOST_TPM_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.log_level = level;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDevicePath);
        }

        let size = self.device.max_response_size;
        if !(HEADER_SIZE..=MAX_RESPONSE_LIMIT).contains(&size) {
            return Err(ConfigError::InvalidMaxResponseSize {
                value: size,
                min: HEADER_SIZE,
                max: MAX_RESPONSE_LIMIT,
            });
        }

        let chunk = self.hashing.chunk_size;
        if chunk == 0 || chunk > MaxBuffer::MAX_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                value: chunk,
                max: MaxBuffer::MAX_SIZE,
            });
        }

        let level = self.logging.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file, or the defaults if it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.device.path, PathBuf::from("/dev/tpmrm0"));
        assert_eq!(config.device.max_response_size, 4096);
        assert_eq!(config.logging.log_level, "warn");
        assert_eq!(config.hashing.chunk_size, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[device]
path = "/dev/tpm0"

[hashing]
chunk_size = 256
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.device.path, PathBuf::from("/dev/tpm0"));
        assert_eq!(config.device.max_response_size, 4096);
        assert_eq!(config.hashing.chunk_size, 256);
        assert_eq!(config.logging.log_level, "warn");
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[device\npath = ");
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[hashing]
chunk_size = "large"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut config = Config::default();
        config.device.path = PathBuf::from("/tmp/tpm-sock");
        config.logging.log_level = "debug".to_string();
        config.hashing.chunk_size = 48;

        let toml = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&toml).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/gost-tpm/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.device.max_response_size = 8192;
        config.save(&path).unwrap();

        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "not [valid toml").unwrap();

        let err = format!("{:#}", Config::load(&path).unwrap_err());
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("gost-tpm/config.toml"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let toml = r#"
[device]
path = "/dev/tpmrm0"
vendor = "acme"
"#;
        assert!(Config::from_toml(toml).is_ok());
    }

    #[test]
    fn test_validate_chunk_size() {
        let mut config = Config::default();
        config.hashing.chunk_size = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidChunkSize { value: 0, max: 1024 })
        );

        config.hashing.chunk_size = 1025;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_max_response_size() {
        let mut config = Config::default();
        config.device.max_response_size = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMaxResponseSize { value: 4, .. })
        ));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.logging.log_level = "loud".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("loud".to_string()))
        );
    }

    #[test]
    fn test_validate_empty_device() {
        let mut config = Config::default();
        config.device.path = PathBuf::new();
        assert_eq!(config.validate(), Err(ConfigError::EmptyDevicePath));
    }

    #[test]
    #[serial]
    fn test_env_override_device() {
        let mut config = Config::default();
        std::env::set_var("GOST_TPM_DEVICE", "/dev/tpm1");
        config.apply_env_overrides();
        std::env::remove_var("GOST_TPM_DEVICE");

        assert_eq!(config.device.path, PathBuf::from("/dev/tpm1"));
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        let mut config = Config::default();
        std::env::set_var("GOST_TPM_LOG_LEVEL", "");
        config.apply_env_overrides();
        std::env::remove_var("GOST_TPM_LOG_LEVEL");

        assert_eq!(config.logging.log_level, "warn");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        let mut config = Config::default();
        std::env::set_var("GOST_TPM_LOG_LEVEL", "trace");
        config.apply_env_overrides();
        std::env::remove_var("GOST_TPM_LOG_LEVEL");

        assert_eq!(config.logging.log_level, "trace");
    }
}
