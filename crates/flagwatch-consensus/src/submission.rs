// FLAG SUBMISSION
// Validates and records new anomaly flags, and applies submitter updates.
//
// SAFETY INVARIANTS:
// 1. Checks run in a fixed order; the first failure is the reported error
// 2. Nothing is written and no fee is charged unless every check passes
// 3. `flagged` uses the threshold in force at the moment of the call

use log::{info, warn};
use serde::{Deserialize, Serialize};

use flagwatch_core::{
    AnomalyType, CallContext, Category, DetectorError, DetectorState, Flag, FlagId,
    FlagStatus, FlagUpdate, RoleRegistry, TokenLedger, MAX_CONFIDENCE, MAX_LOCATION_LEN,
    MAX_PRIORITY, MAX_REASON_LEN, MAX_TX_ID_LEN,
};

/// Raw submission as received at the boundary. Enum fields are still strings
/// so they are checked in their place in the validation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitFlagRequest {
    pub tx_id: String,
    pub score: u32,
    pub anomaly_type: String,
    pub reason: String,
    pub confidence: u32,
    pub location: String,
    pub category: String,
    pub priority: u32,
    pub expiry: u64,
}

pub struct FlagSubmission<'a> {
    roles: &'a dyn RoleRegistry,
    ledger: &'a dyn TokenLedger,
}

impl<'a> FlagSubmission<'a> {
    pub fn new(roles: &'a dyn RoleRegistry, ledger: &'a dyn TokenLedger) -> Self {
        FlagSubmission { roles, ledger }
    }

    /// Validate and store a flag, charging the submission fee to the caller.
    pub fn submit(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        request: SubmitFlagRequest,
    ) -> Result<FlagId, DetectorError> {
        let config = state.snapshot_config();

        if state.flags.count() >= config.max_flags {
            return Err(DetectorError::MaxFlagsExceeded(config.max_flags));
        }
        if !valid_tx_id(&request.tx_id) {
            return Err(DetectorError::InvalidTxId);
        }
        if !config.score_in_bounds(request.score) {
            return Err(DetectorError::InvalidScore(request.score));
        }
        let anomaly_type: AnomalyType = request.anomaly_type.parse()?;
        if request.reason.chars().count() > MAX_REASON_LEN {
            return Err(DetectorError::InvalidReason);
        }
        if request.confidence > MAX_CONFIDENCE {
            return Err(DetectorError::InvalidConfidence(request.confidence));
        }
        if request.location.chars().count() > MAX_LOCATION_LEN {
            return Err(DetectorError::InvalidLocation);
        }
        let category: Category = request.category.parse()?;
        if request.priority > MAX_PRIORITY {
            return Err(DetectorError::InvalidPriority(request.priority));
        }
        if request.expiry <= ctx.height {
            return Err(DetectorError::InvalidExpiry {
                expiry: request.expiry,
                height: ctx.height,
            });
        }
        if !self.roles.is_authorized_oracle(&ctx.caller) {
            warn!("Rejected flag for {} from non-oracle {}", request.tx_id, ctx.caller);
            return Err(DetectorError::InvalidSubmitter);
        }
        if state.flags.contains_tx_id(&request.tx_id) {
            return Err(DetectorError::FlagAlreadyExists(request.tx_id));
        }
        let authority = state
            .authority_account
            .clone()
            .ok_or(DetectorError::AuthorityNotVerified)?;
        let expires_at = ctx
            .height
            .checked_add(config.voting_duration)
            .ok_or(DetectorError::ArithmeticOverflow)?;

        if config.submission_fee > 0 {
            self.ledger
                .transfer(config.submission_fee, &ctx.caller, &authority)?;
        }

        let flag = Flag {
            id: state.flags.next_id(),
            flagged: config.is_flagged(request.score),
            tx_id: request.tx_id,
            score: request.score,
            anomaly_type,
            reason: request.reason,
            confidence: request.confidence,
            timestamp: ctx.height,
            submitter: ctx.caller.clone(),
            active: true,
            location: request.location,
            category,
            priority: request.priority,
            expiry: request.expiry,
            config_version: config.version,
            created_at: ctx.height,
            expires_at,
            status: FlagStatus::Pending,
            yes_votes: 0,
            no_votes: 0,
            total_staked: 0,
        };
        let flagged = flag.flagged;
        let id = state.flags.insert(flag)?;

        info!(
            "Flag {} submitted by {} (flagged: {}, voting until {}, fee {})",
            id, ctx.caller, flagged, expires_at, config.submission_fee
        );
        Ok(id)
    }

    /// Overwrite score and reason. Only the original submitter may call.
    pub fn update(
        &self,
        state: &mut DetectorState,
        ctx: &CallContext,
        flag_id: FlagId,
        new_score: u32,
        new_reason: String,
    ) -> Result<(), DetectorError> {
        let config = state.snapshot_config();

        let flag = state
            .flags
            .get(flag_id)
            .ok_or(DetectorError::FlagNotFound(flag_id))?;
        if flag.submitter != ctx.caller {
            return Err(DetectorError::NotSubmitter);
        }
        if !config.score_in_bounds(new_score) {
            return Err(DetectorError::InvalidScore(new_score));
        }
        if new_reason.chars().count() > MAX_REASON_LEN {
            return Err(DetectorError::InvalidReason);
        }

        let update = FlagUpdate {
            update_score: new_score,
            update_flagged: config.is_flagged(new_score),
            update_reason: new_reason,
            update_timestamp: ctx.height,
            updater: ctx.caller.clone(),
        };
        let flagged = update.update_flagged;
        state.flags.apply_update(flag_id, update)?;

        info!("Flag {} updated by {} (score {}, flagged: {})", flag_id, ctx.caller, new_score, flagged);
        Ok(())
    }
}

fn valid_tx_id(tx_id: &str) -> bool {
    !tx_id.is_empty() && tx_id.len() <= MAX_TX_ID_LEN && tx_id.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagwatch_core::{InMemoryLedger, Principal, StaticRoles, TransferRecord};

    pub(crate) fn request(tx_id: &str) -> SubmitFlagRequest {
        SubmitFlagRequest {
            tx_id: tx_id.to_string(),
            score: 85,
            anomaly_type: "fraud".to_string(),
            reason: "Suspicious pattern".to_string(),
            confidence: 90,
            location: "DeFi pool".to_string(),
            category: "defi".to_string(),
            priority: 8,
            expiry: 100,
        }
    }

    fn setup() -> (DetectorState, StaticRoles, InMemoryLedger) {
        let mut state = DetectorState::default();
        state.authority_account = Some(Principal::from("ST2TEST"));
        let roles = StaticRoles::with_members(vec![Principal::from("ST1TEST")], vec![]);
        let ledger = InMemoryLedger::new();
        ledger.mint(&Principal::from("ST1TEST"), 10_000);
        (state, roles, ledger)
    }

    #[test]
    fn test_submit_flag_success() {
        let (mut state, roles, ledger) = setup();
        let ctx = CallContext::new("ST1TEST", 0);

        let id = FlagSubmission::new(&roles, &ledger)
            .submit(&mut state, &ctx, request("tx123"))
            .unwrap();

        assert_eq!(id, 0);
        let flag = state.flags.get(0).unwrap();
        assert_eq!(flag.tx_id, "tx123");
        assert!(flag.flagged);
        assert_eq!(flag.anomaly_type, AnomalyType::Fraud);
        assert_eq!(flag.category, Category::Defi);
        assert_eq!(flag.expires_at, 144);
        assert_eq!(flag.status, FlagStatus::Pending);
        assert_eq!(
            ledger.transfers(),
            vec![TransferRecord {
                amount: 500,
                from: Principal::from("ST1TEST"),
                to: Principal::from("ST2TEST"),
            }]
        );
    }

    #[test]
    fn test_validation_order_first_failure_wins() {
        let (mut state, roles, ledger) = setup();
        state.authority_account = None;
        let ctx = CallContext::new("ST9NOBODY", 0);
        let submission = FlagSubmission::new(&roles, &ledger);

        // Bad score, bad type, non-oracle and no authority: score is checked first
        let mut req = request("tx1");
        req.score = 101;
        req.anomaly_type = "invalid".to_string();
        assert_eq!(
            submission.submit(&mut state, &ctx, req),
            Err(DetectorError::InvalidScore(101))
        );

        let mut req = request("tx1");
        req.anomaly_type = "invalid".to_string();
        req.priority = 11;
        assert_eq!(
            submission.submit(&mut state, &ctx, req),
            Err(DetectorError::InvalidAnomalyType("invalid".to_string()))
        );

        assert_eq!(
            submission.submit(&mut state, &ctx, request("tx1")),
            Err(DetectorError::InvalidSubmitter)
        );

        let oracle = CallContext::new("ST1TEST", 0);
        assert_eq!(
            submission.submit(&mut state, &oracle, request("tx1")),
            Err(DetectorError::AuthorityNotVerified)
        );
        assert!(ledger.transfers().is_empty());
        assert_eq!(state.flags.count(), 0);
    }

    #[test]
    fn test_field_bounds() {
        let (mut state, roles, ledger) = setup();
        let ctx = CallContext::new("ST1TEST", 50);
        let submission = FlagSubmission::new(&roles, &ledger);

        let cases: Vec<(SubmitFlagRequest, u32)> = vec![
            (SubmitFlagRequest { tx_id: String::new(), ..request("x") }, 101),
            (SubmitFlagRequest { tx_id: "a".repeat(65), ..request("x") }, 101),
            (SubmitFlagRequest { tx_id: "tx\u{e9}".to_string(), ..request("x") }, 101),
            (SubmitFlagRequest { reason: "r".repeat(201), ..request("x") }, 105),
            (SubmitFlagRequest { confidence: 101, ..request("x") }, 109),
            (SubmitFlagRequest { location: "l".repeat(101), ..request("x") }, 122),
            (SubmitFlagRequest { category: "gaming".to_string(), ..request("x") }, 123),
            (SubmitFlagRequest { priority: 11, ..request("x") }, 124),
            (SubmitFlagRequest { expiry: 50, ..request("x") }, 125),
        ];
        for (req, code) in cases {
            assert_eq!(submission.submit(&mut state, &ctx, req).unwrap_err().code(), code);
        }
        assert!(submission
            .submit(&mut state, &ctx, SubmitFlagRequest { tx_id: "a".repeat(64), ..request("x") })
            .is_ok());
    }

    #[test]
    fn test_duplicate_tx_id_rejected() {
        let (mut state, roles, ledger) = setup();
        let ctx = CallContext::new("ST1TEST", 0);
        let submission = FlagSubmission::new(&roles, &ledger);
        submission.submit(&mut state, &ctx, request("tx123")).unwrap();

        let mut again = request("tx123");
        again.anomaly_type = "laundering".to_string();
        assert_eq!(
            submission.submit(&mut state, &ctx, again),
            Err(DetectorError::FlagAlreadyExists("tx123".to_string()))
        );
        assert_eq!(ledger.transfers().len(), 1);
    }

    #[test]
    fn test_capacity_checked_first() {
        let (mut state, roles, ledger) = setup();
        state.config.max_flags = 1;
        let ctx = CallContext::new("ST1TEST", 0);
        let submission = FlagSubmission::new(&roles, &ledger);
        submission.submit(&mut state, &ctx, request("tx110")).unwrap();

        let mut bad = request("");
        bad.score = 500;
        assert_eq!(
            submission.submit(&mut state, &ctx, bad),
            Err(DetectorError::MaxFlagsExceeded(1))
        );
    }

    #[test]
    fn test_failed_fee_transfer_writes_nothing() {
        let (mut state, roles, _) = setup();
        let broke = InMemoryLedger::new();
        let ctx = CallContext::new("ST1TEST", 0);

        let err = FlagSubmission::new(&roles, &broke)
            .submit(&mut state, &ctx, request("tx1"))
            .unwrap_err();

        assert!(matches!(err, DetectorError::Transfer(_)));
        assert_eq!(state.flags.count(), 0);
        assert!(!state.flags.contains_tx_id("tx1"));
    }

    #[test]
    fn test_zero_fee_skips_transfer() {
        let (mut state, roles, ledger) = setup();
        state.config.submission_fee = 0;
        let ctx = CallContext::new("ST1TEST", 0);
        FlagSubmission::new(&roles, &ledger)
            .submit(&mut state, &ctx, request("tx1"))
            .unwrap();
        assert!(ledger.transfers().is_empty());
    }

    #[test]
    fn test_update_recomputes_flagged() {
        let (mut state, roles, ledger) = setup();
        let submission = FlagSubmission::new(&roles, &ledger);
        submission
            .submit(&mut state, &CallContext::new("ST1TEST", 0), request("tx103"))
            .unwrap();

        submission
            .update(&mut state, &CallContext::new("ST1TEST", 7), 0, 75, "New reason".to_string())
            .unwrap();

        let flag = state.flags.get(0).unwrap();
        assert_eq!(flag.score, 75);
        assert!(!flag.flagged);
        assert_eq!(flag.reason, "New reason");
        assert_eq!(flag.timestamp, 7);
        let update = state.flags.update_record(0).unwrap();
        assert_eq!(update.update_score, 75);
        assert!(!update.update_flagged);
        assert_eq!(update.updater, Principal::from("ST1TEST"));
    }

    #[test]
    fn test_update_uses_threshold_at_update_time() {
        let (mut state, roles, ledger) = setup();
        let submission = FlagSubmission::new(&roles, &ledger);
        let owner = CallContext::new("ST1TEST", 0);
        submission
            .submit(&mut state, &owner, SubmitFlagRequest { score: 75, ..request("tx105") })
            .unwrap();
        assert!(!state.flags.get(0).unwrap().flagged);

        state.config = state.config.revise(|c| c.anomaly_threshold = 70).unwrap();
        submission
            .update(&mut state, &CallContext::new("ST1TEST", 3), 0, 75, "Same score".to_string())
            .unwrap();

        let flag = state.flags.get(0).unwrap();
        assert!(flag.flagged);
        assert_eq!(flag.config_version, 0);
        assert!(state.flags.update_record(0).unwrap().update_flagged);
    }

    #[test]
    fn test_update_rejections() {
        let (mut state, roles, ledger) = setup();
        let submission = FlagSubmission::new(&roles, &ledger);
        let owner = CallContext::new("ST1TEST", 0);
        submission.submit(&mut state, &owner, request("tx104")).unwrap();

        assert_eq!(
            submission.update(&mut state, &owner, 99, 75, "r".to_string()),
            Err(DetectorError::FlagNotFound(99))
        );
        assert_eq!(
            submission.update(&mut state, &CallContext::new("ST3FAKE", 0), 0, 75, "r".to_string()),
            Err(DetectorError::NotSubmitter)
        );
        assert_eq!(
            submission.update(&mut state, &owner, 0, 101, "r".to_string()),
            Err(DetectorError::InvalidScore(101))
        );
        assert!(state.flags.update_record(0).is_none());
    }
}
