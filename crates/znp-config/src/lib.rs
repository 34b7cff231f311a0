//! Minimal configuration loading for the ZNP API layer.
//!
//! The correlation engine itself (`znp-api`) takes its timeouts as plain
//! function arguments and never reads this crate directly — configuration
//! is an ambient, host-process concern, not part of the core's contract.
//! This crate exists for the binaries and facades that wire a concrete
//! `RawTransport` (a serial port) and a `Mediator` together.
//!
//! # Config file locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/znp-api/config.toml` (system)
//! 2. `~/.config/znp-api/config.toml` (user)
//! 3. `./znp.toml` (local override)
//! 4. Environment variables (`ZNP_*`)
//!
//! # Example
//!
//! ```toml
//! [transport]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [timeouts]
//! waiter_secs = 15
//! af_confirm_secs = 5
//!
//! [telemetry]
//! log_level = "info"
//! ```

mod loader;

pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse {
        path: std::path::PathBuf,
        message: String,
    },
}

/// Serial transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "TransportConfig::default_port")]
    pub port: String,
    #[serde(default = "TransportConfig::default_baud_rate")]
    pub baud_rate: u32,
}

impl TransportConfig {
    fn default_port() -> String {
        "/dev/ttyACM0".to_string()
    }
    fn default_baud_rate() -> u32 {
        115_200
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            baud_rate: Self::default_baud_rate(),
        }
    }
}

/// Default timeouts handed to `wait_for` calls the facade makes on the
/// caller's behalf. The request tracker itself has no timeout (spec.md
/// §4.2) — these only govern AREQ follow-ups and the state-wait helper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "TimeoutsConfig::default_waiter_secs")]
    pub waiter_secs: u64,
    #[serde(default = "TimeoutsConfig::default_af_confirm_secs")]
    pub af_confirm_secs: u64,
}

impl TimeoutsConfig {
    fn default_waiter_secs() -> u64 {
        15
    }
    fn default_af_confirm_secs() -> u64 {
        5
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            waiter_secs: Self::default_waiter_secs(),
            af_confirm_secs: Self::default_af_confirm_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Complete ZNP API host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ZnpConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl ZnpConfig {
    /// Load configuration from all sources (system, user, local, env).
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load from a specific file path, then apply environment overrides.
    pub fn load_from(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(path)?;
        Ok(config)
    }

    /// Load configuration and report which sources contributed.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = ZnpConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }
}
