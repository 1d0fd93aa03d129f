//! Configuration management

use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::logging::LoggingConfig;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Process-wide settings shared by every delve component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub logging: LoggingConfig,
}

impl DelveConfig {
    /// Default location of the configuration file, e.g. `~/.config/delve/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("delve")
            .join("config.toml")
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let config: DelveConfig = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        save_toml(self, path)
    }

    /// Validate configuration
    pub fn validate(&self) -> DelveResult<()> {
        if self.logging.log_to_file && self.logging.log_file_path.is_none() {
            return Err(crate::config_error!(
                "logging.log_file_path must be set when log_to_file is enabled",
                "config"
            ));
        }
        Ok(())
    }
}

/// Read and deserialize a TOML file
pub fn load_toml<T, P>(path: P) -> DelveResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
        message: format!("Failed to read config file {}: {}", path.display(), e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("config")
            .with_operation("read_file")
            .with_suggestion("Check if the config file exists and is readable"),
    })?;

    toml::from_str(&content).map_err(|e| DelveError::Config {
        message: format!("Failed to parse config: {}", e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("config")
            .with_operation("parse_toml")
            .with_suggestion("Check TOML syntax in config file"),
    })
}

/// Serialize a value and write it to a TOML file
pub fn save_toml<T, P>(value: &T, path: P) -> DelveResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let content = toml::to_string_pretty(value).map_err(|e| DelveError::Config {
        message: format!("Failed to serialize config: {}", e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("config").with_operation("serialize_toml"),
    })?;

    std::fs::write(path, content).map_err(|e| DelveError::Config {
        message: format!("Failed to write config file: {}", e),
        source: Some(Box::new(e)),
        context: ErrorContext::new("config")
            .with_operation("write_file")
            .with_suggestion("Check if the directory exists and is writable"),
    })?;

    Ok(())
}
