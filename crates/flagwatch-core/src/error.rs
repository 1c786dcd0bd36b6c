// DETECTOR ERRORS
// Every failure crossing the public boundary is a value of `DetectorError`.
//
// Each variant carries a stable numeric code and belongs to exactly one
// `ErrorKind`. A failing operation never leaves a partial write behind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::types::{Amount, Principal};

/// Broad grouping of failures, used by callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Caller lacks the required role, or the system is not initialized
    Authorization,
    /// Field out of bounds, unknown variant, duplicate or capacity violation
    Validation,
    /// Unknown flag or proposal id
    NotFound,
    /// Operation conflicts with the current lifecycle state
    StateConflict,
    /// An external collaborator refused the request
    Collaborator,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::StateConflict => "state-conflict",
            ErrorKind::Collaborator => "collaborator",
        }
    }
}

/// Failure reported by the value-transfer collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Insufficient balance in {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        account: Principal,
        needed: Amount,
        available: Amount,
    },
    #[error("Transfer amount must be non-zero")]
    ZeroAmount,
    #[error("Sender and recipient are the same account")]
    SameAccount,
    #[error("Balance overflow for {0}")]
    BalanceOverflow(Principal),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectorError {
    // --- authorization ---
    #[error("Caller is not authorized")]
    NotAuthorized,
    #[error("Caller is not a registered oracle")]
    InvalidSubmitter,
    #[error("Only the original submitter may update a flag")]
    NotSubmitter,
    #[error("Authority account not configured")]
    AuthorityNotVerified,
    #[error("Oracle principal not configured")]
    OracleNotConfigured,
    #[error("Authority account already configured")]
    AuthorityAlreadySet,
    #[error("Principal may not be the caller itself")]
    InvalidPrincipal,

    // --- validation ---
    #[error("Transaction id must be 1-64 ASCII characters")]
    InvalidTxId,
    #[error("Anomaly score {0} outside configured bounds")]
    InvalidScore(u32),
    #[error("Threshold {0} must be within 1-100")]
    InvalidThreshold(u32),
    #[error("Unknown anomaly type: {0}")]
    InvalidAnomalyType(String),
    #[error("Reason exceeds 200 characters")]
    InvalidReason,
    #[error("Description exceeds 200 characters")]
    InvalidDescription,
    #[error("Confidence {0} exceeds 100")]
    InvalidConfidence(u32),
    #[error("Location exceeds 100 characters")]
    InvalidLocation,
    #[error("Unknown category: {0}")]
    InvalidCategory(String),
    #[error("Priority {0} exceeds 10")]
    InvalidPriority(u32),
    #[error("Expiry {expiry} must be after current height {height}")]
    InvalidExpiry { expiry: u64, height: u64 },
    #[error("A flag already exists for transaction {0}")]
    FlagAlreadyExists(String),
    #[error("Flag capacity of {0} reached")]
    MaxFlagsExceeded(u64),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    // --- not found ---
    #[error("Flag {0} not found")]
    FlagNotFound(u64),
    #[error("Proposal {0} not found")]
    ProposalNotFound(u64),

    // --- state conflict ---
    #[error("Validator already voted on flag {0}")]
    AlreadyVoted(u64),
    #[error("Voting on flag {0} is closed")]
    VotingClosed(u64),
    #[error("Flag {flag_id} voting window open until height {expires_at}")]
    FlagNotExpired { flag_id: u64, expires_at: u64 },
    #[error("Stake {amount} below minimum {minimum}")]
    StakeBelowMinimum { amount: Amount, minimum: Amount },
    #[error("Flag {0} already finalized")]
    AlreadyFinalized(u64),
    #[error("Proposal {0} expired")]
    ProposalExpired(u64),
    #[error("Escrow holds {available}, settlement requires {required}")]
    InsufficientEscrow { required: Amount, available: Amount },

    // --- collaborator ---
    #[error("Transfer failed: {0}")]
    Transfer(#[from] TransferError),
}

impl DetectorError {
    /// Stable numeric code reported to external callers.
    pub fn code(&self) -> u32 {
        match self {
            DetectorError::NotAuthorized => 100,
            DetectorError::InvalidTxId => 101,
            DetectorError::InvalidScore(_) => 102,
            DetectorError::InvalidThreshold(_) => 103,
            DetectorError::InvalidAnomalyType(_) => 104,
            DetectorError::InvalidReason => 105,
            DetectorError::InvalidSubmitter => 107,
            DetectorError::NotSubmitter => 108,
            DetectorError::InvalidConfidence(_) => 109,
            DetectorError::OracleNotConfigured => 114,
            DetectorError::ProposalNotFound(_) => 116,
            DetectorError::FlagAlreadyExists(_) => 118,
            DetectorError::FlagNotFound(_) => 119,
            DetectorError::MaxFlagsExceeded(_) => 120,
            DetectorError::AuthorityNotVerified => 121,
            DetectorError::InvalidLocation => 122,
            DetectorError::InvalidCategory(_) => 123,
            DetectorError::InvalidPriority(_) => 124,
            DetectorError::InvalidExpiry { .. } => 125,
            DetectorError::InvalidDescription => 126,
            DetectorError::InvalidPrincipal => 127,
            DetectorError::AuthorityAlreadySet => 128,
            DetectorError::Config(_) => 129,
            DetectorError::AlreadyVoted(_) => 130,
            DetectorError::VotingClosed(_) => 131,
            DetectorError::FlagNotExpired { .. } => 132,
            DetectorError::StakeBelowMinimum { .. } => 133,
            DetectorError::AlreadyFinalized(_) => 134,
            DetectorError::ProposalExpired(_) => 135,
            DetectorError::InsufficientEscrow { .. } => 136,
            DetectorError::ArithmeticOverflow => 137,
            DetectorError::Transfer(_) => 140,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use DetectorError::*;
        match self {
            NotAuthorized | InvalidSubmitter | NotSubmitter | AuthorityNotVerified
            | OracleNotConfigured | AuthorityAlreadySet | InvalidPrincipal => ErrorKind::Authorization,

            InvalidTxId | InvalidScore(_) | InvalidThreshold(_) | InvalidAnomalyType(_)
            | InvalidReason | InvalidDescription | InvalidConfidence(_) | InvalidLocation
            | InvalidCategory(_) | InvalidPriority(_) | InvalidExpiry { .. }
            | FlagAlreadyExists(_) | MaxFlagsExceeded(_) | Config(_)
            | ArithmeticOverflow => ErrorKind::Validation,

            FlagNotFound(_) | ProposalNotFound(_) => ErrorKind::NotFound,

            AlreadyVoted(_) | VotingClosed(_) | FlagNotExpired { .. } | StakeBelowMinimum { .. }
            | AlreadyFinalized(_) | ProposalExpired(_)
            | InsufficientEscrow { .. } => ErrorKind::StateConflict,

            Transfer(_) => ErrorKind::Collaborator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_follow_detector_numbering() {
        assert_eq!(DetectorError::MaxFlagsExceeded(1).code(), 120);
        assert_eq!(DetectorError::AuthorityNotVerified.code(), 121);
        assert_eq!(DetectorError::InvalidExpiry { expiry: 1, height: 1 }.code(), 125);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(DetectorError::AlreadyVoted(0).kind(), ErrorKind::StateConflict);
        assert_eq!(DetectorError::FlagNotFound(3).kind(), ErrorKind::NotFound);
        assert_eq!(DetectorError::InvalidSubmitter.kind(), ErrorKind::Authorization);
        assert_eq!(
            DetectorError::from(TransferError::ZeroAmount).kind(),
            ErrorKind::Collaborator
        );
    }
}
