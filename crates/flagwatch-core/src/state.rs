// DETECTOR STATE
// Everything the engine persists, grouped so that one critical section
// owns all of it. Proposals and settlement history live with their
// respective crates.

use crate::config::DetectorConfig;
use crate::flag_store::FlagStore;
use crate::stake_ledger::StakeLedger;
use crate::types::Principal;

/// Default account holding locked validator stake.
pub const DEFAULT_ESCROW: &str = "flagwatch.escrow";

#[derive(Debug, Clone)]
pub struct DetectorState {
    pub config: DetectorConfig,
    pub flags: FlagStore,
    pub stakes: StakeLedger,
    /// Receives submission fees. `None` until the system is initialized.
    pub authority_account: Option<Principal>,
    pub oracle_principal: Option<Principal>,
    /// Holds locked stake and pays out settlements
    pub escrow: Principal,
}

impl DetectorState {
    pub fn new(config: DetectorConfig) -> Self {
        DetectorState {
            config,
            flags: FlagStore::new(),
            stakes: StakeLedger::new(),
            authority_account: None,
            oracle_principal: None,
            escrow: Principal::from(DEFAULT_ESCROW),
        }
    }

    pub fn with_escrow(mut self, escrow: Principal) -> Self {
        self.escrow = escrow;
        self
    }

    /// Copy of the configuration an operation reads from start to finish.
    pub fn snapshot_config(&self) -> DetectorConfig {
        self.config
    }
}

impl Default for DetectorState {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
