//! Configuration management for tilefetch
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use tilefetch::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Staging tiles under: {}", config.staging.root.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `TILEFETCH__<section>__<key>`
//!
//! Examples:
//! - `TILEFETCH__PORTAL__BASE_URL=http://localhost:9000/dladownload/`
//! - `TILEFETCH__POLLING__MAX_ATTEMPTS=600`
//! - `TILEFETCH__VERIFY__MIN_SIZE=50KB`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/tilefetch.toml`.
//! This can be overridden using the `TILEFETCH_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    BatchConfig, Config, FetchConfig, PollingConfig, PortalConfig, ProductConfig,
    StagingConfig, SubmissionConfig, VerifyConfig,
};
pub use validation::ValidationError;

use std::path::PathBuf;
use thiserror::Error;

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
    /// 1. Environment variables (`TILEFETCH__*`)
    /// 2. TOML file (default: `config/tilefetch.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Re-run validation after command-line overrides were applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)?;
        Ok(())
    }
}
