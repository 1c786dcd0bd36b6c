// FLAGWATCH ENGINE
// Public facade over flag submission, stake voting, finalization and
// governance.
//
// SAFETY INVARIANTS:
// 1. Every public operation runs inside one critical section
// 2. Operations are applied in the order they acquire the lock
// 3. A failed operation leaves all state exactly as it found it
// 4. Read-only views observe only fully applied operations

use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use flagwatch_consensus::{
    ConsensusFinalizer, FlagSubmission, SettlementRecord, StakeVoting, SubmitFlagRequest,
};
use flagwatch_core::{
    Amount, CallContext, DetectorConfig, DetectorError, DetectorState, Flag, FlagId,
    FlagStatus, FlagUpdate, Principal, Proposal, ProposalId, RoleRegistry, TokenLedger,
    ValidatorStake,
};
use flagwatch_governance::{Administration, ProposalBook};

#[derive(Debug, Default)]
struct EngineState {
    core: DetectorState,
    proposals: ProposalBook,
    settlements: BTreeMap<FlagId, SettlementRecord>,
}

/// Thread-safe detector. Share it across threads with `Arc<Detector>`.
pub struct Detector {
    state: Mutex<EngineState>,
    ledger: Arc<dyn TokenLedger>,
    roles: Arc<dyn RoleRegistry>,
}

impl Detector {
    pub fn new(
        config: DetectorConfig,
        ledger: Arc<dyn TokenLedger>,
        roles: Arc<dyn RoleRegistry>,
    ) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(Detector {
            state: Mutex::new(EngineState {
                core: DetectorState::new(config),
                ..EngineState::default()
            }),
            ledger,
            roles,
        })
    }

    /// Use `escrow` instead of the default escrow account.
    pub fn with_escrow(mut self, escrow: Principal) -> Self {
        self.state.get_mut().core.escrow = escrow;
        self
    }

    pub fn escrow(&self) -> Principal {
        self.state.lock().core.escrow.clone()
    }

    // ---- administration ----

    pub fn set_authority_account(&self, ctx: &CallContext, account: Principal) -> Result<(), DetectorError> {
        let mut state = self.state.lock();
        Administration::new(self.roles.as_ref()).set_authority_account(&mut state.core, ctx, account)
    }

    pub fn set_oracle_principal(&self, ctx: &CallContext, oracle: Principal) -> Result<(), DetectorError> {
        let mut state = self.state.lock();
        Administration::new(self.roles.as_ref()).set_oracle_principal(&mut state.core, ctx, oracle)
    }

    pub fn set_anomaly_threshold(&self, ctx: &CallContext, threshold: u32) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_anomaly_threshold(core, ctx, threshold))
    }

    pub fn set_max_flags(&self, ctx: &CallContext, max_flags: u64) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_max_flags(core, ctx, max_flags))
    }

    pub fn set_submission_fee(&self, ctx: &CallContext, fee: Amount) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_submission_fee(core, ctx, fee))
    }

    pub fn set_min_stake(&self, ctx: &CallContext, min_stake: Amount) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_min_stake(core, ctx, min_stake))
    }

    pub fn set_voting_duration(&self, ctx: &CallContext, blocks: u64) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_voting_duration(core, ctx, blocks))
    }

    pub fn set_consensus_threshold(&self, ctx: &CallContext, threshold: u32) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_consensus_threshold(core, ctx, threshold))
    }

    pub fn set_slash_percentage(&self, ctx: &CallContext, percentage: u32) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_slash_percentage(core, ctx, percentage))
    }

    pub fn set_reward_bonus(&self, ctx: &CallContext, bonus: Amount) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_reward_bonus(core, ctx, bonus))
    }

    pub fn set_score_bounds(&self, ctx: &CallContext, min: u32, max: u32) -> Result<(), DetectorError> {
        self.administer(|admin, core| admin.set_score_bounds(core, ctx, min, max))
    }

    fn administer<F>(&self, f: F) -> Result<(), DetectorError>
    where
        F: FnOnce(&Administration<'_>, &mut DetectorState) -> Result<(), DetectorError>,
    {
        let mut state = self.state.lock();
        f(&Administration::new(self.roles.as_ref()), &mut state.core)
    }

    // ---- flags ----

    pub fn submit_flag(&self, ctx: &CallContext, request: SubmitFlagRequest) -> Result<FlagId, DetectorError> {
        let mut state = self.state.lock();
        FlagSubmission::new(self.roles.as_ref(), self.ledger.as_ref()).submit(&mut state.core, ctx, request)
    }

    pub fn update_flag(
        &self,
        ctx: &CallContext,
        flag_id: FlagId,
        new_score: u32,
        new_reason: String,
    ) -> Result<(), DetectorError> {
        let mut state = self.state.lock();
        FlagSubmission::new(self.roles.as_ref(), self.ledger.as_ref())
            .update(&mut state.core, ctx, flag_id, new_score, new_reason)
    }

    // ---- consensus ----

    pub fn stake_and_vote(
        &self,
        ctx: &CallContext,
        flag_id: FlagId,
        vote: bool,
        amount: Amount,
    ) -> Result<Amount, DetectorError> {
        let mut state = self.state.lock();
        StakeVoting::new(self.ledger.as_ref()).stake_and_vote(&mut state.core, ctx, flag_id, vote, amount)
    }

    pub fn lock_stake(&self, ctx: &CallContext, flag_id: FlagId, amount: Amount) -> Result<Amount, DetectorError> {
        let mut state = self.state.lock();
        StakeVoting::new(self.ledger.as_ref()).lock_stake(&mut state.core, ctx, flag_id, amount)
    }

    /// Close voting on a flag and settle its stakes. The settlement record is
    /// kept and available through [`Detector::get_settlement`].
    pub fn finalize_flag(&self, ctx: &CallContext, flag_id: FlagId) -> Result<FlagStatus, DetectorError> {
        let mut state = self.state.lock();
        let record = ConsensusFinalizer::new(self.ledger.as_ref()).finalize(&mut state.core, ctx, flag_id)?;
        let status = record.status;
        debug!("Settlement for flag {} hashed {}", flag_id, record.hash_hex());
        state.settlements.insert(flag_id, record);
        Ok(status)
    }

    // ---- governance ----

    pub fn create_proposal(
        &self,
        ctx: &CallContext,
        description: String,
        new_threshold: u32,
        expiry: u64,
    ) -> Result<ProposalId, DetectorError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state
            .proposals
            .create_proposal(&state.core, self.roles.as_ref(), ctx, description, new_threshold, expiry)
    }

    pub fn vote_on_proposal(&self, ctx: &CallContext, id: ProposalId, support: bool) -> Result<bool, DetectorError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state
            .proposals
            .vote_on_proposal(&mut state.core, self.roles.as_ref(), ctx, id, support)
    }

    // ---- read-only views ----

    pub fn get_flag(&self, flag_id: FlagId) -> Option<Flag> {
        self.state.lock().core.flags.get(flag_id).cloned()
    }

    pub fn get_flag_by_tx_id(&self, tx_id: &str) -> Option<Flag> {
        self.state.lock().core.flags.get_by_tx_id(tx_id).cloned()
    }

    /// All flags in id order.
    pub fn flags(&self) -> Vec<Flag> {
        self.state.lock().core.flags.iter().cloned().collect()
    }

    pub fn get_flag_update(&self, flag_id: FlagId) -> Option<FlagUpdate> {
        self.state.lock().core.flags.update_record(flag_id).cloned()
    }

    pub fn get_flag_count(&self) -> u64 {
        self.state.lock().core.flags.count()
    }

    pub fn check_flag_existence(&self, tx_id: &str) -> bool {
        self.state.lock().core.flags.contains_tx_id(tx_id)
    }

    pub fn get_anomaly_threshold(&self) -> u32 {
        self.state.lock().core.config.anomaly_threshold
    }

    pub fn get_proposal(&self, id: ProposalId) -> Option<Proposal> {
        self.state.lock().proposals.get(id).cloned()
    }

    pub fn next_proposal_id(&self) -> ProposalId {
        self.state.lock().proposals.next_id()
    }

    pub fn get_validator_stake(&self, flag_id: FlagId, validator: &Principal) -> Option<ValidatorStake> {
        self.state.lock().core.stakes.get(flag_id, validator).copied()
    }

    pub fn get_validator_total_stake(&self, validator: &Principal) -> Amount {
        self.state.lock().core.stakes.total_locked(validator)
    }

    pub fn get_settlement(&self, flag_id: FlagId) -> Option<SettlementRecord> {
        self.state.lock().settlements.get(&flag_id).cloned()
    }

    pub fn config(&self) -> DetectorConfig {
        self.state.lock().core.snapshot_config()
    }
}
