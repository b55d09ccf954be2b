//! gattlink CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Default values
//! - `gattlink.toml` in the working directory
//! - The file passed with `--config`
//! - Environment variables (`GATTLINK_*`, nested keys separated by `__`,
//!   e.g. `GATTLINK_LINK__RSSI_THRESHOLD=-60`)
//! - Command line arguments

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use gattlink_core::LinkConfig;

use crate::cli::Backend;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the gattlink CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    /// Service identity, proximity gate and task settings
    pub link: LinkConfig,

    /// CLI-specific configuration
    pub cli: CliConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub backend: Backend,

    /// Default scan length for `scan`
    pub scan_duration_secs: u64,

    /// How long `connect` waits for the link to become ready
    pub connect_timeout_secs: u64,

    /// Default listen window for `connect`
    pub listen_secs: u64,

    /// Default advertising window for `advertise`
    pub advertise_duration_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            scan_duration_secs: 5,
            connect_timeout_secs: 15,
            listen_secs: 5,
            advertise_duration_secs: 30,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    fn base_figment(config_path: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file("gattlink.toml"));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("GATTLINK_").split("__"))
    }

    /// Load configuration from the standard layers
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(config_path, None)
    }

    /// Load configuration with command line overrides applied last
    pub fn load_with_overrides(
        config_path: Option<&Path>,
        backend: Option<Backend>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::FileSystem(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
        }

        let mut figment = Self::base_figment(config_path);
        if let Some(backend) = backend {
            figment = figment.merge(("cli.backend", backend));
        }

        let config: CliAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single file on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()));

        let config: CliAppConfig = figment.extract().map_err(|e| {
            ConfigError::Loading(format!(
                "Failed to load from {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.cli.scan_duration_secs == 0 {
            return Err(ConfigError::Validation(
                "Scan duration must be greater than 0".to_string(),
            ));
        }
        if self.cli.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Connect timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
