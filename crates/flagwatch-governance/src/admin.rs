// ADMINISTRATION
// Authority-gated configuration setters and one-time role wiring.
//
// SAFETY INVARIANTS:
// 1. The authority account can be set exactly once
// 2. Parameter changes require a configured authority and an authorized caller
// 3. Every accepted change is validated as a whole and bumps the config version

use log::{info, warn};

use flagwatch_core::{
    Amount, CallContext, DetectorConfig, DetectorError, DetectorState, Principal, RoleRegistry,
};

pub struct Administration<'a> {
    roles: &'a dyn RoleRegistry,
}

impl<'a> Administration<'a> {
    pub fn new(roles: &'a dyn RoleRegistry) -> Self {
        Administration { roles }
    }

    pub fn set_authority_account(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        account: Principal,
    ) -> Result<(), DetectorError> {
        if account == ctx.caller {
            return Err(DetectorError::InvalidPrincipal);
        }
        if state.authority_account.is_some() {
            return Err(DetectorError::AuthorityAlreadySet);
        }
        info!("Authority account set to {} by {}", account, ctx.caller);
        state.authority_account = Some(account);
        Ok(())
    }

    pub fn set_oracle_principal(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        oracle: Principal,
    ) -> Result<(), DetectorError> {
        if oracle == ctx.caller {
            return Err(DetectorError::InvalidPrincipal);
        }
        if state.authority_account.is_none() {
            return Err(DetectorError::AuthorityNotVerified);
        }
        info!("Oracle principal set to {} by {}", oracle, ctx.caller);
        state.oracle_principal = Some(oracle);
        Ok(())
    }

    pub fn set_anomaly_threshold(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        threshold: u32,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "anomaly_threshold", |c| c.anomaly_threshold = threshold)
    }

    pub fn set_max_flags(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        max_flags: u64,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "max_flags", |c| c.max_flags = max_flags)
    }

    pub fn set_submission_fee(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        fee: Amount,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "submission_fee", |c| c.submission_fee = fee)
    }

    pub fn set_min_stake(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        min_stake: Amount,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "min_stake", |c| c.min_stake = min_stake)
    }

    /// Applies to flags submitted afterwards; existing `expires_at` values are kept.
    pub fn set_voting_duration(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        blocks: u64,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "voting_duration", |c| c.voting_duration = blocks)
    }

    pub fn set_consensus_threshold(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        threshold: u32,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "consensus_threshold", |c| c.consensus_threshold = threshold)
    }

    pub fn set_slash_percentage(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        percentage: u32,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "slash_percentage", |c| c.slash_percentage = percentage)
    }

    pub fn set_reward_bonus(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        bonus: Amount,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "reward_bonus", |c| c.reward_bonus = bonus)
    }

    pub fn set_score_bounds(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        min: u32,
        max: u32,
    ) -> Result<(), DetectorError> {
        self.revise(state, ctx, "score_bounds", |c| {
            c.min_score = min;
            c.max_score = max;
        })
    }

    fn revise<F>(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        register: &str,
        change: F,
    ) -> Result<(), DetectorError>
    where
        F: FnOnce(&mut DetectorConfig),
    {
        if state.authority_account.is_none() {
            return Err(DetectorError::AuthorityNotVerified);
        }
        if !self.roles.is_authorized_authority(&ctx.caller) {
            warn!("Rejected {} change from non-authority {}", register, ctx.caller);
            return Err(DetectorError::NotAuthorized);
        }
        let next = state.config.revise(change)?;
        info!("{} changed by {} (config v{})", register, ctx.caller, next.version);
        state.config = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagwatch_core::{ConfigError, StaticRoles};

    fn roles() -> StaticRoles {
        StaticRoles::with_members(Vec::new(), vec![Principal::from("ST1TEST")])
    }

    fn ctx() -> CallContext {
        CallContext::new("ST1TEST", 0)
    }

    #[test]
    fn test_authority_account_is_set_once() {
        let roles = roles();
        let admin = Administration::new(&roles);
        let mut state = DetectorState::default();

        assert_eq!(
            admin.set_authority_account(&mut state, &ctx(), Principal::from("ST1TEST")),
            Err(DetectorError::InvalidPrincipal)
        );
        admin
            .set_authority_account(&mut state, &ctx(), Principal::from("ST2TEST"))
            .unwrap();
        assert_eq!(state.authority_account, Some(Principal::from("ST2TEST")));
        assert_eq!(
            admin.set_authority_account(&mut state, &ctx(), Principal::from("ST3TEST")),
            Err(DetectorError::AuthorityAlreadySet)
        );
    }

    #[test]
    fn test_oracle_requires_authority() {
        let roles = roles();
        let admin = Administration::new(&roles);
        let mut state = DetectorState::default();

        assert_eq!(
            admin.set_oracle_principal(&mut state, &ctx(), Principal::from("ST3ORACLE")),
            Err(DetectorError::AuthorityNotVerified)
        );
        admin
            .set_authority_account(&mut state, &ctx(), Principal::from("ST2TEST"))
            .unwrap();
        assert_eq!(
            admin.set_oracle_principal(&mut state, &ctx(), Principal::from("ST1TEST")),
            Err(DetectorError::InvalidPrincipal)
        );
        admin
            .set_oracle_principal(&mut state, &ctx(), Principal::from("ST3ORACLE"))
            .unwrap();
        assert_eq!(state.oracle_principal, Some(Principal::from("ST3ORACLE")));
    }

    #[test]
    fn test_setters_bump_version() {
        let roles = roles();
        let admin = Administration::new(&roles);
        let mut state = DetectorState::default();
        state.authority_account = Some(Principal::from("ST2TEST"));

        admin.set_submission_fee(&mut state, &ctx(), 1000).unwrap();
        admin.set_score_bounds(&mut state, &ctx(), 10, 90).unwrap();
        admin.set_reward_bonus(&mut state, &ctx(), 0).unwrap();

        assert_eq!(state.config.submission_fee, 1000);
        assert_eq!((state.config.min_score, state.config.max_score), (10, 90));
        assert_eq!(state.config.reward_bonus, 0);
        assert_eq!(state.config.version, 3);
    }

    #[test]
    fn test_setters_reject_invalid_values() {
        let roles = roles();
        let admin = Administration::new(&roles);
        let mut state = DetectorState::default();
        state.authority_account = Some(Principal::from("ST2TEST"));

        assert_eq!(
            admin.set_anomaly_threshold(&mut state, &ctx(), 0),
            Err(DetectorError::Config(ConfigError::AnomalyThreshold(0)))
        );
        assert_eq!(
            admin.set_max_flags(&mut state, &ctx(), 0),
            Err(DetectorError::Config(ConfigError::MaxFlags))
        );
        assert_eq!(
            admin.set_slash_percentage(&mut state, &ctx(), 101),
            Err(DetectorError::Config(ConfigError::SlashPercentage(101)))
        );
        assert_eq!(
            admin.set_score_bounds(&mut state, &ctx(), 50, 40),
            Err(DetectorError::Config(ConfigError::ScoreBounds { min: 50, max: 40 }))
        );
        assert_eq!(state.config, DetectorConfig::default());
    }

    #[test]
    fn test_setters_require_authority() {
        let roles = roles();
        let admin = Administration::new(&roles);
        let mut state = DetectorState::default();

        assert_eq!(
            admin.set_min_stake(&mut state, &ctx(), 5),
            Err(DetectorError::AuthorityNotVerified)
        );
        state.authority_account = Some(Principal::from("ST2TEST"));
        assert_eq!(
            admin.set_consensus_threshold(&mut state, &CallContext::new("ST9NOBODY", 0), 51),
            Err(DetectorError::NotAuthorized)
        );
        admin.set_voting_duration(&mut state, &ctx(), 10).unwrap();
        assert_eq!(state.config.voting_duration, 10);
    }
}
