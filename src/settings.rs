// STARTUP SETTINGS
// Layered detector configuration: built-in defaults, then an optional TOML
// file, then FLAGWATCH_* environment variables.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use config::{Config, Environment, File, FileFormat};
use flagwatch_core::{ConfigError, DetectorConfig};

pub const ENV_PREFIX: &str = "FLAGWATCH";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Source(#[from] config::ConfigError),
    #[error("Invalid detector configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Registers that may be overridden at startup. Amounts are read as u64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub anomaly_threshold: Option<u32>,
    pub min_score: Option<u32>,
    pub max_score: Option<u32>,
    pub max_flags: Option<u64>,
    pub submission_fee: Option<u64>,
    pub min_stake: Option<u64>,
    pub voting_duration: Option<u64>,
    pub consensus_threshold: Option<u32>,
    pub slash_percentage: Option<u32>,
    pub reward_bonus: Option<u64>,
}

impl Settings {
    /// Overlay these settings on `base` and validate the result.
    pub fn apply(&self, base: DetectorConfig) -> Result<DetectorConfig, ConfigError> {
        let mut config = base;
        if let Some(v) = self.anomaly_threshold {
            config.anomaly_threshold = v;
        }
        if let Some(v) = self.min_score {
            config.min_score = v;
        }
        if let Some(v) = self.max_score {
            config.max_score = v;
        }
        if let Some(v) = self.max_flags {
            config.max_flags = v;
        }
        if let Some(v) = self.submission_fee {
            config.submission_fee = v.into();
        }
        if let Some(v) = self.min_stake {
            config.min_stake = v.into();
        }
        if let Some(v) = self.voting_duration {
            config.voting_duration = v;
        }
        if let Some(v) = self.consensus_threshold {
            config.consensus_threshold = v;
        }
        if let Some(v) = self.slash_percentage {
            config.slash_percentage = v;
        }
        if let Some(v) = self.reward_bonus {
            config.reward_bonus = v.into();
        }
        config.validate()?;
        Ok(config)
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

/// Load the detector configuration for a run.
pub fn load(path: Option<&Path>) -> Result<DetectorConfig, SettingsError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }
    let settings: Settings = builder.add_source(environment()).build()?.try_deserialize()?;
    Ok(settings.apply(DetectorConfig::default())?)
}
