//! Dispatcher configuration.
//!
//! Everything has a sensible default so an empty TOML file (or
//! `Config::default()`) yields a working dispatcher; deployments override the
//! quota ledger path and the telemetry address.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;

const fn default_daily_limit() -> u32 {
    410
}

const fn default_pacing_secs() -> u64 {
    4
}

fn default_quota_path() -> PathBuf {
    PathBuf::from("quota.json")
}

fn default_telemetry_address() -> String {
    "usage-reports@campaigner.tools".to_string()
}

/// Runtime configuration for the campaign dispatcher.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Where the durable quota ledger lives.
    #[serde(default = "default_quota_path")]
    pub quota_path: PathBuf,

    /// Sends allowed per identity per rolling 24h window. Covers the
    /// confirmation and telemetry messages as well as the recipients.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Seconds between consecutive recipient sends. A hard minimum meant to
    /// stay under relay abuse thresholds, not an adaptive backoff.
    #[serde(default = "default_pacing_secs")]
    pub pacing_secs: u64,

    /// Operator address receiving the per-campaign usage notification.
    #[serde(default = "default_telemetry_address")]
    pub telemetry_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quota_path: default_quota_path(),
            daily_limit: default_daily_limit(),
            pacing_secs: default_pacing_secs(),
            telemetry_address: default_telemetry_address(),
        }
    }
}

/// Configuration load failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// The pacing delay as a [`Duration`].
    #[must_use]
    pub const fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }
}
