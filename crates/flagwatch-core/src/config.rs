// DETECTOR CONFIGURATION
// A single versioned configuration value holding every tunable register.
//
// Operations copy the configuration once at their start and read only that
// copy. Setters go through `revise`, which validates the result and
// bumps `version`, so every flag can record which values were in effect.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Amount;

/// Upper bound for scores, thresholds and percentages.
pub const PERCENT_SCALE: u32 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("anomaly_threshold must be within 1-100, got {0}")]
    AnomalyThreshold(u32),
    #[error("score bounds must satisfy min <= max <= 100, got {min}..{max}")]
    ScoreBounds { min: u32, max: u32 },
    #[error("max_flags must be > 0")]
    MaxFlags,
    #[error("consensus_threshold must be within 1-100, got {0}")]
    ConsensusThreshold(u32),
    #[error("slash_percentage must be <= 100, got {0}")]
    SlashPercentage(u32),
    #[error("voting_duration must be > 0")]
    VotingDuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Incremented by every accepted parameter change
    pub version: u64,
    /// Scores strictly above this value are marked `flagged`
    pub anomaly_threshold: u32,
    pub min_score: u32,
    pub max_score: u32,
    /// Maximum number of flags ever created
    pub max_flags: u64,
    /// Charged to the submitter, paid to the authority account
    pub submission_fee: Amount,
    /// Minimum amount per stake call
    pub min_stake: Amount,
    /// Blocks between flag creation and close of voting
    pub voting_duration: u64,
    /// Percentage of voted stake needed to confirm a flag
    pub consensus_threshold: u32,
    /// Percentage withheld from validators on the losing side
    pub slash_percentage: u32,
    /// Paid on top of the returned stake to validators on the winning side
    pub reward_bonus: Amount,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            version: 0,
            anomaly_threshold: 80,
            min_score: 0,
            max_score: 100,
            max_flags: 10_000,
            submission_fee: 500,
            min_stake: 1_000_000,
            voting_duration: 144,
            consensus_threshold: 66,
            slash_percentage: 20,
            reward_bonus: 500_000,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.anomaly_threshold == 0 || self.anomaly_threshold > PERCENT_SCALE {
            return Err(ConfigError::AnomalyThreshold(self.anomaly_threshold));
        }
        if self.min_score > self.max_score || self.max_score > PERCENT_SCALE {
            return Err(ConfigError::ScoreBounds {
                min: self.min_score,
                max: self.max_score,
            });
        }
        if self.max_flags == 0 {
            return Err(ConfigError::MaxFlags);
        }
        if self.consensus_threshold == 0 || self.consensus_threshold > PERCENT_SCALE {
            return Err(ConfigError::ConsensusThreshold(self.consensus_threshold));
        }
        if self.slash_percentage > PERCENT_SCALE {
            return Err(ConfigError::SlashPercentage(self.slash_percentage));
        }
        if self.voting_duration == 0 {
            return Err(ConfigError::VotingDuration);
        }
        Ok(())
    }

    /// Apply `change` to a copy, validate it and return it with the next version.
    pub fn revise<F>(&self, change: F) -> Result<DetectorConfig, ConfigError>
    where
        F: FnOnce(&mut DetectorConfig),
    {
        let mut next = *self;
        change(&mut next);
        next.version = self.version.saturating_add(1);
        next.validate()?;
        Ok(next)
    }

    pub fn score_in_bounds(&self, score: u32) -> bool {
        score >= self.min_score && score <= self.max_score
    }

    pub fn is_flagged(&self, score: u32) -> bool {
        score > self.anomaly_threshold
    }
}
