// FLAGWATCH DATA MODEL
//
// INVARIANTS:
// 1. `total_staked == yes_votes + no_votes` for every flag at all times
// 2. `flagged` is derived once per submission/update, never retroactively
// 3. Flag status leaves `Pending` exactly once
// 4. A (flag, validator) stake entry carries at most one vote

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DetectorError;

pub type FlagId = u64;
pub type ProposalId = u64;
pub type Amount = u128;

/// Account / identity on the host chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(pub String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Principal(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(id: &str) -> Self {
        Principal(id.to_string())
    }
}

impl From<String> for Principal {
    fn from(id: String) -> Self {
        Principal(id)
    }
}

/// Sender and block height of the transaction executing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Principal,
    pub height: u64,
}

impl CallContext {
    pub fn new(caller: impl Into<Principal>, height: u64) -> Self {
        CallContext {
            caller: caller.into(),
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyType {
    Fraud,
    Laundering,
    Exploit,
    WashTrading,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Fraud => "fraud",
            AnomalyType::Laundering => "laundering",
            AnomalyType::Exploit => "exploit",
            AnomalyType::WashTrading => "wash-trading",
        }
    }
}

impl FromStr for AnomalyType {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fraud" => Ok(AnomalyType::Fraud),
            "laundering" => Ok(AnomalyType::Laundering),
            "exploit" => Ok(AnomalyType::Exploit),
            "wash-trading" => Ok(AnomalyType::WashTrading),
            other => Err(DetectorError::InvalidAnomalyType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Defi,
    Nft,
    Dao,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Defi => "defi",
            Category::Nft => "nft",
            Category::Dao => "dao",
            Category::General => "general",
        }
    }
}

impl FromStr for Category {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "defi" => Ok(Category::Defi),
            "nft" => Ok(Category::Nft),
            "dao" => Ok(Category::Dao),
            "general" => Ok(Category::General),
            other => Err(DetectorError::InvalidCategory(other.to_string())),
        }
    }
}

/// Consensus lifecycle of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlagStatus {
    Pending,
    Confirmed,
    Dismissed,
    InsufficientVotes,
}

impl FlagStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlagStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlagStatus::Pending => "pending",
            FlagStatus::Confirmed => "confirmed",
            FlagStatus::Dismissed => "dismissed",
            FlagStatus::InsufficientVotes => "insufficient-votes",
        }
    }
}

impl fmt::Display for FlagStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One anomaly report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub id: FlagId,
    /// External transaction identifier, unique across flags
    pub tx_id: String,
    pub score: u32,
    /// `score > anomaly_threshold` at submission or last update
    pub flagged: bool,
    pub anomaly_type: AnomalyType,
    pub reason: String,
    pub confidence: u32,
    /// Height of submission or of the last update
    pub timestamp: u64,
    pub submitter: Principal,
    /// True while the flag is under review; cleared once finalized
    pub active: bool,
    pub location: String,
    pub category: Category,
    pub priority: u32,
    /// Submitter-supplied expiry height
    pub expiry: u64,
    /// Configuration version in force at submission
    pub config_version: u64,

    pub created_at: u64,
    /// Last height at which stake voting is accepted
    pub expires_at: u64,
    pub status: FlagStatus,
    pub yes_votes: Amount,
    pub no_votes: Amount,
    pub total_staked: Amount,
}

impl Flag {
    pub fn is_voting_open_at(&self, height: u64) -> bool {
        height <= self.expires_at
    }

    pub fn total_votes(&self) -> Amount {
        self.yes_votes.saturating_add(self.no_votes)
    }
}

/// Audit record of the latest submitter update to a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagUpdate {
    pub update_score: u32,
    pub update_flagged: bool,
    pub update_reason: String,
    pub update_timestamp: u64,
    pub updater: Principal,
}

/// Stake locked by one validator on one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStake {
    pub stake: Amount,
    /// `Some(true)` = legitimate, `Some(false)` = not, `None` = locked without a vote
    pub vote: Option<bool>,
}

impl ValidatorStake {
    pub fn has_voted(&self) -> bool {
        self.vote.is_some()
    }
}

/// Governance request to change the anomaly threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub description: String,
    pub new_threshold: u32,
    pub yes_votes: u64,
    pub no_votes: u64,
    pub expiry: u64,
    pub proposer: Principal,
}

impl Proposal {
    pub fn is_open_at(&self, height: u64) -> bool {
        height < self.expiry
    }
}
