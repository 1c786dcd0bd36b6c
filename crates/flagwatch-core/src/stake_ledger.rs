// STAKE LEDGER
// Per-(flag, validator) stake entries plus each validator's running total
// of stake locked across unresolved flags.
//
// INVARIANTS:
// 1. Sole writer of validator aggregates
// 2. Each validator aggregate equals the sum of that validator's entries
// 3. An entry with a vote never accepts further stake

use std::collections::BTreeMap;

use crate::error::DetectorError;
use crate::types::{Amount, FlagId, Principal, ValidatorStake};

#[derive(Debug, Clone, Default)]
pub struct StakeLedger {
    entries: BTreeMap<(FlagId, Principal), ValidatorStake>,
    locked_totals: BTreeMap<Principal, Amount>,
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, flag_id: FlagId, validator: &Principal) -> Option<&ValidatorStake> {
        self.entries.get(&(flag_id, validator.clone()))
    }

    /// Stake `validator` currently has locked across all unresolved flags.
    pub fn total_locked(&self, validator: &Principal) -> Amount {
        self.locked_totals.get(validator).copied().unwrap_or(0)
    }

    /// All entries belonging to `flag_id`, ordered by validator.
    pub fn entries_for(&self, flag_id: FlagId) -> Vec<(Principal, ValidatorStake)> {
        self.entries
            .range((flag_id, Principal::default())..)
            .take_while(|((id, _), _)| *id == flag_id)
            .map(|((_, validator), entry)| (validator.clone(), *entry))
            .collect()
    }

    /// Stake held for every unresolved flag other than `flag_id`.
    pub fn locked_elsewhere(&self, flag_id: FlagId) -> Amount {
        self.entries
            .iter()
            .filter(|((id, _), _)| *id != flag_id)
            .fold(0, |acc: Amount, (_, entry)| acc.saturating_add(entry.stake))
    }

    /// Check that `lock` would succeed, returning the entry's new stake.
    pub fn preview_lock(
        &self,
        flag_id: FlagId,
        validator: &Principal,
        amount: Amount,
    ) -> Result<Amount, DetectorError> {
        let prior = match self.get(flag_id, validator) {
            Some(entry) if entry.has_voted() => return Err(DetectorError::AlreadyVoted(flag_id)),
            Some(entry) => entry.stake,
            None => 0,
        };
        self.total_locked(validator)
            .checked_add(amount)
            .ok_or(DetectorError::ArithmeticOverflow)?;
        prior.checked_add(amount).ok_or(DetectorError::ArithmeticOverflow)
    }

    /// Lock `amount` for `validator` on `flag_id`, optionally attaching a vote.
    /// Returns the entry's accumulated stake.
    pub fn lock(
        &mut self,
        flag_id: FlagId,
        validator: &Principal,
        amount: Amount,
        vote: Option<bool>,
    ) -> Result<Amount, DetectorError> {
        let stake = self.preview_lock(flag_id, validator, amount)?;
        let locked = self.total_locked(validator) + amount;

        self.entries
            .insert((flag_id, validator.clone()), ValidatorStake { stake, vote });
        self.locked_totals.insert(validator.clone(), locked);
        Ok(stake)
    }

    /// Remove an entry and unlock its full stake from the validator aggregate.
    pub fn release(&mut self, flag_id: FlagId, validator: &Principal) -> Option<ValidatorStake> {
        let entry = self.entries.remove(&(flag_id, validator.clone()))?;
        let remaining = self.total_locked(validator).saturating_sub(entry.stake);
        if remaining == 0 {
            self.locked_totals.remove(validator);
        } else {
            self.locked_totals.insert(validator.clone(), remaining);
        }
        Some(entry)
    }
}
