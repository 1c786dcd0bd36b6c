// GOVERNANCE PROPOSALS
// Unweighted oracle voting on changes to the anomaly threshold.
//
// SAFETY INVARIANTS:
// 1. Proposals are never deleted; they become inert once expired
// 2. Each vote call adds exactly one vote to one side
// 3. The margin check runs on every vote, so a threshold may apply
//    before the proposal's own expiry
// 4. Counters and configuration are written together or not at all

use log::{info, warn};
use std::collections::BTreeMap;

use flagwatch_core::{
    CallContext, DetectorError, DetectorState, Proposal, ProposalId, RoleRegistry,
    MAX_REASON_LEN, PERCENT_SCALE,
};

/// Net yes-votes a proposal must exceed before its threshold applies.
pub const PROPOSAL_APPROVAL_MARGIN: u64 = 10;

#[derive(Debug, Clone, Default)]
pub struct ProposalBook {
    proposals: BTreeMap<ProposalId, Proposal>,
    next_proposal_id: ProposalId,
}

impl ProposalBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> ProposalId {
        self.next_proposal_id
    }

    pub fn get(&self, id: ProposalId) -> Option<&Proposal> {
        self.proposals.get(&id)
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn create_proposal(
        &mut self,
        state: &DetectorState,
        roles: &dyn RoleRegistry,
        ctx: &CallContext,
        description: String,
        new_threshold: u32,
        expiry: u64,
    ) -> Result<ProposalId, DetectorError> {
        if description.chars().count() > MAX_REASON_LEN {
            return Err(DetectorError::InvalidDescription);
        }
        if new_threshold == 0 || new_threshold > PERCENT_SCALE {
            return Err(DetectorError::InvalidThreshold(new_threshold));
        }
        if expiry <= ctx.height {
            return Err(DetectorError::InvalidExpiry {
                expiry,
                height: ctx.height,
            });
        }
        if state.authority_account.is_none() {
            return Err(DetectorError::AuthorityNotVerified);
        }
        if !roles.is_authorized_authority(&ctx.caller) {
            warn!("Rejected proposal from non-authority {}", ctx.caller);
            return Err(DetectorError::NotAuthorized);
        }

        let id = self.next_proposal_id;
        let next = id.checked_add(1).ok_or(DetectorError::ArithmeticOverflow)?;
        self.proposals.insert(
            id,
            Proposal {
                id,
                description,
                new_threshold,
                yes_votes: 0,
                no_votes: 0,
                expiry,
                proposer: ctx.caller.clone(),
            },
        );
        self.next_proposal_id = next;

        info!(
            "Proposal {} created by {}: threshold -> {} until {}",
            id, ctx.caller, new_threshold, expiry
        );
        Ok(id)
    }

    /// Record one vote. Returns `true` when this vote carried the proposal
    /// past the approval margin and its threshold was applied.
    pub fn vote_on_proposal(
        &mut self,
        state: &mut DetectorState,
        roles: &dyn RoleRegistry,
        ctx: &CallContext,
        id: ProposalId,
        support: bool,
    ) -> Result<bool, DetectorError> {
        let proposal = self
            .proposals
            .get(&id)
            .ok_or(DetectorError::ProposalNotFound(id))?;
        if !proposal.is_open_at(ctx.height) {
            return Err(DetectorError::ProposalExpired(id));
        }
        if state.oracle_principal.is_none() {
            return Err(DetectorError::OracleNotConfigured);
        }
        if !roles.is_authorized_oracle(&ctx.caller) {
            warn!("Rejected vote on proposal {} from non-oracle {}", id, ctx.caller);
            return Err(DetectorError::NotAuthorized);
        }

        let (yes_votes, no_votes) = if support {
            (
                proposal.yes_votes.checked_add(1).ok_or(DetectorError::ArithmeticOverflow)?,
                proposal.no_votes,
            )
        } else {
            (
                proposal.yes_votes,
                proposal.no_votes.checked_add(1).ok_or(DetectorError::ArithmeticOverflow)?,
            )
        };
        let passes = yes_votes > no_votes.saturating_add(PROPOSAL_APPROVAL_MARGIN);
        let new_threshold = proposal.new_threshold;
        let revised = if passes {
            Some(state.config.revise(|c| c.anomaly_threshold = new_threshold)?)
        } else {
            None
        };

        if let Some(proposal) = self.proposals.get_mut(&id) {
            proposal.yes_votes = yes_votes;
            proposal.no_votes = no_votes;
        }
        if let Some(config) = revised {
            state.config = config;
            info!(
                "Proposal {} passed ({} yes / {} no): anomaly threshold now {} (config v{})",
                id, yes_votes, no_votes, new_threshold, config.version
            );
        }
        Ok(passes)
    }

}
