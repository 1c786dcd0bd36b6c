// Flagwatch core: data model, configuration, ledgers and the interfaces
// to the host's value-transfer and identity services.
pub mod error;
pub mod config;
pub mod types;
pub mod collaborators;
pub mod flag_store;
pub mod stake_ledger;
pub mod state;

pub use error::{DetectorError, ErrorKind, TransferError};

pub use config::{ConfigError, DetectorConfig, PERCENT_SCALE};

pub use types::{
    Amount, AnomalyType, CallContext, Category, Flag, FlagId, FlagStatus, FlagUpdate,
    Principal, Proposal, ProposalId, ValidatorStake,
};

pub use collaborators::{
    InMemoryLedger, RoleRegistry, StaticRoles, TokenLedger, TransferRecord,
};

pub use flag_store::FlagStore;
pub use stake_ledger::StakeLedger;
pub use state::{DetectorState, DEFAULT_ESCROW};

/// Maximum length of a flag's external transaction id.
pub const MAX_TX_ID_LEN: usize = 64;
/// Maximum length of flag reasons and proposal descriptions.
pub const MAX_REASON_LEN: usize = 200;
pub const MAX_LOCATION_LEN: usize = 100;
pub const MAX_CONFIDENCE: u32 = 100;
pub const MAX_PRIORITY: u32 = 10;
