use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

use crate::error::ClassificationConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    DriverLogLevel::Off.as_str().to_string()
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Verbosity of the database driver's own logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DriverLogLevel {
    #[default]
    Off,
    Debug,
    Trace,
}

impl DriverLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverLogLevel::Off => "OFF",
            DriverLogLevel::Debug => "DEBUG",
            DriverLogLevel::Trace => "TRACE",
        }
    }

    /// Filter directive applied to the driver's log target
    pub fn filter_directive(&self) -> String {
        format!("tokio_postgres={}", self.as_str().to_lowercase())
    }
}

impl fmt::Display for DriverLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OFF" => Ok(DriverLogLevel::Off),
            "DEBUG" => Ok(DriverLogLevel::Debug),
            "TRACE" => Ok(DriverLogLevel::Trace),
            _ => Err(format!(
                "Unknown driver log level: {}. Supported: OFF, DEBUG, TRACE",
                s
            )),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        toml::from_str(&contents).context("Failed to parse config file")
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let driver = DriverConfig {
            log_level: std::env::var("PAMPG_DRIVER_LOGLEVEL").unwrap_or_else(|_| default_log_level()),
        };

        Self {
            driver,
            classification: ClassificationConfig::default(),
        }
    }

    /// Driver log level, falling back to OFF when the configured value is unknown
    pub fn driver_log_level(&self) -> DriverLogLevel {
        self.driver.log_level.parse().unwrap_or_else(|e| {
            warn!("{}, using OFF", e);
            DriverLogLevel::Off
        })
    }

    /// Filter directive for the driver's log target.
    ///
    /// Usable before a subscriber exists: an unknown level maps to OFF without a
    /// warning, which [`Config::driver_log_level`] emits later.
    pub fn driver_filter_directive(&self) -> String {
        self.driver
            .log_level
            .parse::<DriverLogLevel>()
            .unwrap_or_default()
            .filter_directive()
    }

    /// Create a sample configuration file
    pub fn create_sample<P: AsRef<Path>>(path: P) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize sample config")?;
        fs::write(path.as_ref(), toml_string)
            .with_context(|| format!("Failed to write sample config to {:?}", path.as_ref()))?;

        Ok(())
    }
}
