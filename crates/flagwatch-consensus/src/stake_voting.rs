// STAKE VOTING
// Validators lock stake on an open flag and cast one vote per flag.
//
// SAFETY INVARIANTS:
// 1. A (flag, validator) pair carries at most one vote
// 2. Ledger entry, validator aggregate, flag tally and flag total move together
// 3. Stake is moved into escrow before anything is recorded; a failed
//    transfer leaves all state untouched

use log::{debug, info};

use flagwatch_core::{Amount, CallContext, DetectorError, DetectorState, FlagId, TokenLedger};

pub struct StakeVoting<'a> {
    ledger: &'a dyn TokenLedger,
}

impl<'a> StakeVoting<'a> {
    pub fn new(ledger: &'a dyn TokenLedger) -> Self {
        StakeVoting { ledger }
    }

    /// Lock `amount` and vote. Any stake the caller locked earlier on this flag
    /// without voting joins the vote. Returns the caller's total stake on the flag.
    pub fn stake_and_vote(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        flag_id: FlagId,
        vote: bool,
        amount: Amount,
    ) -> Result<Amount, DetectorError> {
        self.lock(state, ctx, flag_id, amount, Some(vote))
    }

    /// Lock `amount` without voting yet. Tallies are unchanged until a vote attaches.
    pub fn lock_stake(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        flag_id: FlagId,
        amount: Amount,
    ) -> Result<Amount, DetectorError> {
        self.lock(state, ctx, flag_id, amount, None)
    }

    fn lock(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        flag_id: FlagId,
        amount: Amount,
        vote: Option<bool>,
    ) -> Result<Amount, DetectorError> {
        let config = state.snapshot_config();

        let flag = state
            .flags
            .get(flag_id)
            .ok_or(DetectorError::FlagNotFound(flag_id))?;
        if !flag.is_voting_open_at(ctx.height) || flag.status.is_terminal() {
            return Err(DetectorError::VotingClosed(flag_id));
        }
        if amount < config.min_stake {
            return Err(DetectorError::StakeBelowMinimum {
                amount,
                minimum: config.min_stake,
            });
        }
        let new_stake = state.stakes.preview_lock(flag_id, &ctx.caller, amount)?;
        if let Some(approve) = vote {
            let side = if approve { flag.yes_votes } else { flag.no_votes };
            side.checked_add(new_stake)
                .and(flag.total_staked.checked_add(new_stake))
                .ok_or(DetectorError::ArithmeticOverflow)?;
        }

        if amount > 0 {
            self.ledger.transfer(amount, &ctx.caller, &state.escrow)?;
        }

        state.stakes.lock(flag_id, &ctx.caller, amount, vote)?;
        match vote {
            Some(approve) => {
                state.flags.add_to_tally(flag_id, approve, new_stake)?;
                info!(
                    "Validator {} voted {} on flag {} with {} stake",
                    ctx.caller,
                    if approve { "yes" } else { "no" },
                    flag_id,
                    new_stake
                );
            }
            None => debug!("Validator {} locked {} on flag {} without voting", ctx.caller, amount, flag_id),
        }

        Ok(new_stake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagwatch_core::{
        AnomalyType, Category, Flag, FlagStatus, InMemoryLedger, Principal,
    };

    fn pending_flag(tx_id: &str) -> Flag {
        Flag {
            id: 0,
            tx_id: tx_id.to_string(),
            score: 90,
            flagged: true,
            anomaly_type: AnomalyType::Exploit,
            reason: String::new(),
            confidence: 50,
            timestamp: 1000,
            submitter: Principal::from("ST1TEST"),
            active: true,
            location: String::new(),
            category: Category::General,
            priority: 1,
            expiry: 2000,
            config_version: 0,
            created_at: 1000,
            expires_at: 1144,
            status: FlagStatus::Pending,
            yes_votes: 0,
            no_votes: 0,
            total_staked: 0,
        }
    }

    fn setup() -> (DetectorState, InMemoryLedger) {
        let mut state = DetectorState::default();
        state.flags.insert(pending_flag("tx123")).unwrap();
        let ledger = InMemoryLedger::new();
        for who in ["ST1TEST", "ST2VALIDATOR", "ST3VALIDATOR"] {
            ledger.mint(&Principal::from(who), 50_000_000);
        }
        (state, ledger)
    }

    #[test]
    fn test_stake_and_vote_updates_all_counters() {
        let (mut state, ledger) = setup();
        let ctx = CallContext::new("ST1TEST", 1000);

        let total = StakeVoting::new(&ledger)
            .stake_and_vote(&mut state, &ctx, 0, true, 2_000_000)
            .unwrap();

        assert_eq!(total, 2_000_000);
        let flag = state.flags.get(0).unwrap();
        assert_eq!(flag.yes_votes, 2_000_000);
        assert_eq!(flag.total_staked, 2_000_000);
        assert_eq!(state.stakes.total_locked(&ctx.caller), 2_000_000);
        assert_eq!(ledger.balance(&state.escrow), 2_000_000);
        assert_eq!(ledger.balance(&ctx.caller), 48_000_000);
    }

    #[test]
    fn test_double_vote_rejected() {
        let (mut state, ledger) = setup();
        let voting = StakeVoting::new(&ledger);
        let ctx = CallContext::new("ST1TEST", 1000);
        voting.stake_and_vote(&mut state, &ctx, 0, true, 2_000_000).unwrap();

        assert_eq!(
            voting.stake_and_vote(&mut state, &ctx, 0, false, 1_000_000),
            Err(DetectorError::AlreadyVoted(0))
        );
        assert_eq!(
            voting.lock_stake(&mut state, &ctx, 0, 1_000_000),
            Err(DetectorError::AlreadyVoted(0))
        );
        let flag = state.flags.get(0).unwrap();
        assert_eq!(flag.no_votes, 0);
        assert_eq!(ledger.balance(&state.escrow), 2_000_000);
    }

    #[test]
    fn test_minimum_stake_enforced() {
        let (mut state, ledger) = setup();
        let ctx = CallContext::new("ST1TEST", 1000);
        assert_eq!(
            StakeVoting::new(&ledger).stake_and_vote(&mut state, &ctx, 0, true, 500_000),
            Err(DetectorError::StakeBelowMinimum { amount: 500_000, minimum: 1_000_000 })
        );
    }

    #[test]
    fn test_voting_window_inclusive_of_expiry() {
        let (mut state, ledger) = setup();
        let voting = StakeVoting::new(&ledger);

        assert!(voting
            .stake_and_vote(&mut state, &CallContext::new("ST1TEST", 1144), 0, true, 1_000_000)
            .is_ok());
        assert_eq!(
            voting.stake_and_vote(&mut state, &CallContext::new("ST2VALIDATOR", 1145), 0, true, 1_000_000),
            Err(DetectorError::VotingClosed(0))
        );
    }

    #[test]
    fn test_unknown_flag() {
        let (mut state, ledger) = setup();
        assert_eq!(
            StakeVoting::new(&ledger).stake_and_vote(&mut state, &CallContext::new("ST1TEST", 1000), 7, true, 1_000_000),
            Err(DetectorError::FlagNotFound(7))
        );
    }

    #[test]
    fn test_prior_lock_joins_vote() {
        let (mut state, ledger) = setup();
        let voting = StakeVoting::new(&ledger);
        let ctx = CallContext::new("ST2VALIDATOR", 1010);

        voting.lock_stake(&mut state, &ctx, 0, 1_000_000).unwrap();
        assert_eq!(state.flags.get(0).unwrap().total_staked, 0);
        voting.lock_stake(&mut state, &ctx, 0, 1_000_000).unwrap();

        let total = voting.stake_and_vote(&mut state, &ctx, 0, false, 1_000_000).unwrap();
        assert_eq!(total, 3_000_000);
        let flag = state.flags.get(0).unwrap();
        assert_eq!(flag.no_votes, 3_000_000);
        assert_eq!(flag.total_staked, flag.yes_votes + flag.no_votes);
        assert_eq!(state.stakes.total_locked(&ctx.caller), 3_000_000);
    }

    #[test]
    fn test_failed_transfer_leaves_state_untouched() {
        let (mut state, _) = setup();
        let empty = InMemoryLedger::new();
        let ctx = CallContext::new("ST1TEST", 1000);

        let err = StakeVoting::new(&empty)
            .stake_and_vote(&mut state, &ctx, 0, true, 2_000_000)
            .unwrap_err();

        assert!(matches!(err, DetectorError::Transfer(_)));
        assert!(state.stakes.get(0, &ctx.caller).is_none());
        assert_eq!(state.stakes.total_locked(&ctx.caller), 0);
        assert_eq!(state.flags.get(0).unwrap().total_staked, 0);
    }

    #[test]
    fn test_validator_totals_tracked_per_validator() {
        let (mut state, ledger) = setup();
        let voting = StakeVoting::new(&ledger);
        voting.stake_and_vote(&mut state, &CallContext::new("ST1TEST", 1000), 0, true, 2_000_000).unwrap();
        voting.stake_and_vote(&mut state, &CallContext::new("ST2VALIDATOR", 1000), 0, true, 3_000_000).unwrap();

        assert_eq!(state.stakes.total_locked(&Principal::from("ST1TEST")), 2_000_000);
        assert_eq!(state.stakes.total_locked(&Principal::from("ST2VALIDATOR")), 3_000_000);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn total_staked_equals_sum_of_sides(
                calls in proptest::collection::vec((0usize..3, any::<bool>(), any::<bool>(), 1_000_000u128..5_000_000), 1..30)
            ) {
                let (mut state, ledger) = setup();
                let voting = StakeVoting::new(&ledger);
                let validators = ["ST1TEST", "ST2VALIDATOR", "ST3VALIDATOR"];
                for (who, with_vote, approve, amount) in calls {
                    let ctx = CallContext::new(validators[who], 1000);
                    let _ = if with_vote {
                        voting.stake_and_vote(&mut state, &ctx, 0, approve, amount)
                    } else {
                        voting.lock_stake(&mut state, &ctx, 0, amount)
                    };
                    let flag = state.flags.get(0).unwrap();
                    prop_assert_eq!(flag.total_staked, flag.yes_votes + flag.no_votes);
                }
                let locked: Amount = validators
                    .iter()
                    .map(|v| state.stakes.total_locked(&Principal::from(*v)))
                    .sum();
                prop_assert_eq!(ledger.balance(&state.escrow), locked);
            }
        }
    }
}
