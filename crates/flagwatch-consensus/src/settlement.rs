//! SETTLEMENT RECORDS
//!
//! Outcome arithmetic and the audit record written for every finalized flag.
//! All arithmetic is integer-only; percentages are whole numbers out of 100.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use flagwatch_core::{Amount, FlagId, FlagStatus, Principal, PERCENT_SCALE};

/// `yes * 100 >= total * threshold`, or `None` on overflow.
pub fn consensus_reached(yes_votes: Amount, total_votes: Amount, threshold: u32) -> Option<bool> {
    let lhs = yes_votes.checked_mul(PERCENT_SCALE as Amount)?;
    let rhs = total_votes.checked_mul(threshold as Amount)?;
    Some(lhs >= rhs)
}

/// `floor(stake * percentage / 100)` without overflow for `percentage <= 100`.
pub fn percentage_of(stake: Amount, percentage: u32) -> Amount {
    let scale = PERCENT_SCALE as Amount;
    let pct = percentage as Amount;
    (stake / scale) * pct + (stake % scale) * pct / scale
}

/// Amount returned to a voter: stake plus bonus if correct, stake minus slash otherwise.
pub fn payout_amount(stake: Amount, correct: bool, reward_bonus: Amount, slash_percentage: u32) -> Option<Amount> {
    if correct {
        stake.checked_add(reward_bonus)
    } else {
        stake.checked_sub(percentage_of(stake, slash_percentage))
    }
}

/// Settlement of one voting validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub validator: Principal,
    /// Stake that was locked (and is unlocked in full)
    pub stake: Amount,
    pub vote: bool,
    /// Vote matched the outcome
    pub correct: bool,
    /// Amount paid from escrow
    pub amount: Amount,
}

/// Stake locked without a vote, returned unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub validator: Principal,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPayout {
    pub validator: Principal,
    pub amount: Amount,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub flag_id: FlagId,
    pub status: FlagStatus,
    pub yes_votes: Amount,
    pub no_votes: Amount,
    pub consensus_threshold: u32,
    pub config_version: u64,
    /// Height at which the flag was finalized
    pub settled_at: u64,
    pub payouts: Vec<Payout>,
    pub refunds: Vec<Refund>,
    pub failed_payouts: Vec<FailedPayout>,
    pub computation_hash: Vec<u8>,
}

impl SettlementRecord {
    pub fn total_votes(&self) -> Amount {
        self.yes_votes.saturating_add(self.no_votes)
    }

    /// Everything owed from escrow: payouts plus refunds.
    pub fn total_owed(&self) -> Option<Amount> {
        self.payouts
            .iter()
            .map(|p| p.amount)
            .chain(self.refunds.iter().map(|r| r.amount))
            .try_fold(0 as Amount, |acc, amount| acc.checked_add(amount))
    }

    /// Amount forfeited by validators on the losing side.
    pub fn total_slashed(&self) -> Amount {
        self.payouts
            .iter()
            .filter(|p| !p.correct)
            .map(|p| p.stake.saturating_sub(p.amount))
            .sum()
    }

    pub fn compute_hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.flag_id.to_le_bytes());
        hasher.update(self.status.as_str().as_bytes());
        hasher.update(self.yes_votes.to_le_bytes());
        hasher.update(self.no_votes.to_le_bytes());
        hasher.update(self.consensus_threshold.to_le_bytes());
        hasher.update(self.config_version.to_le_bytes());
        hasher.update(self.settled_at.to_le_bytes());
        for payout in &self.payouts {
            hasher.update(payout.validator.as_str().as_bytes());
            hasher.update(payout.stake.to_le_bytes());
            hasher.update([payout.vote as u8, payout.correct as u8]);
            hasher.update(payout.amount.to_le_bytes());
        }
        for refund in &self.refunds {
            hasher.update(refund.validator.as_str().as_bytes());
            hasher.update(refund.amount.to_le_bytes());
        }
        for failed in &self.failed_payouts {
            hasher.update(failed.validator.as_str().as_bytes());
            hasher.update(failed.amount.to_le_bytes());
        }
        hasher.finalize().to_vec()
    }

    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.computation_hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(&self.computation_hash)
    }
}
