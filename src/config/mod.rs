//! Configuration management for printbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use printbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Printing through: {}", config.service.url);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `PRINTBOX__<section>__<key>`
//!
//! Examples:
//! - `PRINTBOX__SERVICE__URL=https://print.example.com/print`
//! - `PRINTBOX__POLLING__INTERVAL=500ms`
//! - `PRINTBOX__POLLING__TIMEOUT=10m`
//!
//! The layer access token is only ever read from `PRINTBOX_LAYER_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/printbox.toml`.
//! This can be overridden using the `PRINTBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{Config, PageConfig, PollingConfig, PrintDefaults, ServiceConfig};
pub use validation::ValidationError;

use thiserror::Error;

use crate::client::{HttpConfig, PollingPolicy};
use crate::encoder::{CustomizerChain, ExtentClip, TokenInjector};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`PRINTBOX__*`)
    /// 2. TOML file (default: `config/printbox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (bad service URL, zero polling interval, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_path(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: self.service.connect_timeout.as_duration(),
            request_timeout: self.service.request_timeout.as_duration(),
            user_agent: self.service.user_agent.clone(),
        }
    }

    pub fn polling_policy(&self) -> PollingPolicy {
        PollingPolicy {
            interval: self.polling.interval.as_duration(),
            timeout: self.polling.timeout.as_duration(),
        }
    }

    /// Layer customizers switched on by this configuration, in application order
    pub fn customizers(&self) -> CustomizerChain {
        let mut chain = CustomizerChain::new();
        if self.print.clip_to_extent {
            chain = chain.with(ExtentClip);
        }
        if let Some(token) = &self.service.layer_token {
            chain = chain.with(TokenInjector::new(&self.service.token_param, token));
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[service]
url = "https://geomapfish-demo-2-8.camptocamp.com/printproxy"
layout = "2 A4 landscape"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.service.layout, "2 A4 landscape");
        assert_eq!(config.polling_policy().interval, Duration::from_secs(1));
    }

    #[test]
    fn test_validation_rejects_bad_polling() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[polling]
interval = "10s"
timeout = "1s"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::TimeoutShorterThanInterval { .. })
        ));
    }

    #[test]
    fn test_derived_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[service]
url = "http://127.0.0.1:8080/print"
user_agent = "printbox-test"
connect_timeout = "2s"
request_timeout = "15s"

[polling]
interval = "200ms"
timeout = "30s"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        let http = config.http_config();
        assert_eq!(http.connect_timeout, Duration::from_secs(2));
        assert_eq!(http.request_timeout, Duration::from_secs(15));
        assert_eq!(http.user_agent, "printbox-test");

        let policy = config.polling_policy();
        assert_eq!(policy.interval, Duration::from_millis(200));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_customizers_follow_config() {
        let mut config = Config::default();
        config.service.layer_token = None;
        assert!(config.customizers().is_empty());

        config.print.clip_to_extent = true;
        config.service.layer_token = Some("secret".to_string());
        assert_eq!(config.customizers().len(), 2);
    }
}
