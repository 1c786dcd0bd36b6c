// CONSENSUS FINALIZER
// Closes a flag once its voting window has passed, decides the outcome from
// stake-weighted votes, and settles every stake entry on the flag.
//
// SAFETY INVARIANTS:
// 1. Finalization is only possible strictly after `expires_at`
// 2. A flag is finalized at most once; no entry is ever paid twice
// 3. Escrow not reserved for other pending flags must cover every payout
//    before anything is written
// 4. The full locked stake is unlocked from the validator aggregate,
//    regardless of the amount paid out

use log::{debug, error, info};

use flagwatch_core::{
    Amount, CallContext, DetectorError, DetectorState, FlagId, FlagStatus, TokenLedger,
};

use crate::settlement::{
    consensus_reached, payout_amount, FailedPayout, Payout, Refund, SettlementRecord,
};

pub struct ConsensusFinalizer<'a> {
    ledger: &'a dyn TokenLedger,
}

impl<'a> ConsensusFinalizer<'a> {
    pub fn new(ledger: &'a dyn TokenLedger) -> Self {
        ConsensusFinalizer { ledger }
    }

    pub fn finalize(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        flag_id: FlagId,
    ) -> Result<SettlementRecord, DetectorError> {
        let config = state.snapshot_config();

        let flag = state
            .flags
            .get(flag_id)
            .ok_or(DetectorError::FlagNotFound(flag_id))?;
        if ctx.height <= flag.expires_at {
            return Err(DetectorError::FlagNotExpired {
                flag_id,
                expires_at: flag.expires_at,
            });
        }
        if flag.status.is_terminal() {
            return Err(DetectorError::AlreadyFinalized(flag_id));
        }

        let total_votes = flag
            .yes_votes
            .checked_add(flag.no_votes)
            .ok_or(DetectorError::ArithmeticOverflow)?;
        let status = if total_votes == 0 {
            FlagStatus::InsufficientVotes
        } else if consensus_reached(flag.yes_votes, total_votes, config.consensus_threshold)
            .ok_or(DetectorError::ArithmeticOverflow)?
        {
            FlagStatus::Confirmed
        } else {
            FlagStatus::Dismissed
        };

        let mut record = SettlementRecord {
            flag_id,
            status,
            yes_votes: flag.yes_votes,
            no_votes: flag.no_votes,
            consensus_threshold: config.consensus_threshold,
            config_version: config.version,
            settled_at: ctx.height,
            payouts: Vec::new(),
            refunds: Vec::new(),
            failed_payouts: Vec::new(),
            computation_hash: Vec::new(),
        };

        let entries = state.stakes.entries_for(flag_id);
        for (validator, entry) in &entries {
            match entry.vote {
                Some(vote) if status != FlagStatus::InsufficientVotes => {
                    let correct = vote == (status == FlagStatus::Confirmed);
                    let amount = payout_amount(
                        entry.stake,
                        correct,
                        config.reward_bonus,
                        config.slash_percentage,
                    )
                    .ok_or(DetectorError::ArithmeticOverflow)?;
                    record.payouts.push(Payout {
                        validator: validator.clone(),
                        stake: entry.stake,
                        vote,
                        correct,
                        amount,
                    });
                }
                _ => record.refunds.push(Refund {
                    validator: validator.clone(),
                    amount: entry.stake,
                }),
            }
        }

        // stake locked on other pending flags is not available to this one
        let required = record.total_owed().ok_or(DetectorError::ArithmeticOverflow)?;
        let reserved = state.stakes.locked_elsewhere(flag_id);
        let available = self.ledger.balance(&state.escrow).saturating_sub(reserved);
        if available < required {
            error!(
                "Cannot settle flag {}: escrow {} has {} free ({} reserved), needs {}",
                flag_id, state.escrow, available, reserved, required
            );
            return Err(DetectorError::InsufficientEscrow { required, available });
        }

        state.flags.close(flag_id, status)?;
        for (validator, _) in &entries {
            state.stakes.release(flag_id, validator);
        }

        let transfers: Vec<(_, Amount)> = record
            .payouts
            .iter()
            .map(|p| (p.validator.clone(), p.amount))
            .chain(record.refunds.iter().map(|r| (r.validator.clone(), r.amount)))
            .filter(|(_, amount)| *amount > 0)
            .collect();
        for (validator, amount) in transfers {
            match self.ledger.transfer(amount, &state.escrow, &validator) {
                Ok(()) => debug!("Paid {} to {} for flag {}", amount, validator, flag_id),
                Err(e) => {
                    error!("Payout of {} to {} for flag {} failed: {}", amount, validator, flag_id, e);
                    record.failed_payouts.push(FailedPayout {
                        validator,
                        amount,
                        reason: e.to_string(),
                    });
                }
            }
        }
        record.computation_hash = record.compute_hash();

        info!(
            "Flag {} finalized as {} ({} yes / {} no, {} payouts, {} refunds, {} slashed)",
            flag_id,
            status,
            record.yes_votes,
            record.no_votes,
            record.payouts.len(),
            record.refunds.len(),
            record.total_slashed()
        );
        Ok(record)
    }
}
