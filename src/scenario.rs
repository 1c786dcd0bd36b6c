// SCENARIO REPLAY
// Drives a fresh in-memory detector through a scripted sequence of calls
// and reports every outcome.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use flagwatch_consensus::SubmitFlagRequest;
use flagwatch_core::{
    Amount, CallContext, DetectorConfig, DetectorError, ErrorKind, Flag, InMemoryLedger,
    Principal, StaticRoles, TokenLedger,
};

use crate::engine::Detector;

/// Script file layout. Balances are plain integers so they survive
/// any JSON reader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub accounts: BTreeMap<Principal, u64>,
    #[serde(default)]
    pub oracles: Vec<Principal>,
    #[serde(default)]
    pub authorities: Vec<Principal>,
    #[serde(default)]
    pub escrow: Option<Principal>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub caller: Principal,
    #[serde(default)]
    pub height: u64,
    pub op: Operation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    SetAuthorityAccount { account: Principal },
    SetOraclePrincipal { oracle: Principal },
    SetAnomalyThreshold { threshold: u32 },
    SetMaxFlags { max_flags: u64 },
    SetSubmissionFee { fee: u64 },
    SetMinStake { min_stake: u64 },
    SetVotingDuration { blocks: u64 },
    SetConsensusThreshold { threshold: u32 },
    SetSlashPercentage { percentage: u32 },
    SetRewardBonus { bonus: u64 },
    SetScoreBounds { min: u32, max: u32 },
    SubmitFlag(SubmitFlagRequest),
    UpdateFlag { flag_id: u64, score: u32, reason: String },
    StakeAndVote { flag_id: u64, vote: bool, amount: u64 },
    LockStake { flag_id: u64, amount: u64 },
    FinalizeFlag { flag_id: u64 },
    CreateProposal { description: String, new_threshold: u32, expiry: u64 },
    VoteOnProposal { proposal_id: u64, support: bool },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::SetAuthorityAccount { .. } => "set_authority_account",
            Operation::SetOraclePrincipal { .. } => "set_oracle_principal",
            Operation::SetAnomalyThreshold { .. } => "set_anomaly_threshold",
            Operation::SetMaxFlags { .. } => "set_max_flags",
            Operation::SetSubmissionFee { .. } => "set_submission_fee",
            Operation::SetMinStake { .. } => "set_min_stake",
            Operation::SetVotingDuration { .. } => "set_voting_duration",
            Operation::SetConsensusThreshold { .. } => "set_consensus_threshold",
            Operation::SetSlashPercentage { .. } => "set_slash_percentage",
            Operation::SetRewardBonus { .. } => "set_reward_bonus",
            Operation::SetScoreBounds { .. } => "set_score_bounds",
            Operation::SubmitFlag(_) => "submit_flag",
            Operation::UpdateFlag { .. } => "update_flag",
            Operation::StakeAndVote { .. } => "stake_and_vote",
            Operation::LockStake { .. } => "lock_stake",
            Operation::FinalizeFlag { .. } => "finalize_flag",
            Operation::CreateProposal { .. } => "create_proposal",
            Operation::VoteOnProposal { .. } => "vote_on_proposal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub code: u32,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DetectorError> for ErrorReport {
    fn from(err: &DetectorError) -> Self {
        ErrorReport {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub op: &'static str,
    pub caller: Principal,
    pub height: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub steps: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub anomaly_threshold: u32,
    pub config_version: u64,
    pub flags: Vec<Flag>,
    pub balances: BTreeMap<Principal, Amount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub outcomes: Vec<StepOutcome>,
    pub summary: ScenarioSummary,
}

/// u128 values above `u64::MAX` are rendered as decimal strings.
fn amount_value(amount: Amount) -> Value {
    match u64::try_from(amount) {
        Ok(small) => Value::from(small),
        Err(_) => Value::String(amount.to_string()),
    }
}

fn apply(detector: &Detector, ctx: &CallContext, op: Operation) -> Result<Value, DetectorError> {
    let value = match op {
        Operation::SetAuthorityAccount { account } => {
            detector.set_authority_account(ctx, account).map(|_| Value::Bool(true))?
        }
        Operation::SetOraclePrincipal { oracle } => {
            detector.set_oracle_principal(ctx, oracle).map(|_| Value::Bool(true))?
        }
        Operation::SetAnomalyThreshold { threshold } => {
            detector.set_anomaly_threshold(ctx, threshold).map(|_| Value::Bool(true))?
        }
        Operation::SetMaxFlags { max_flags } => {
            detector.set_max_flags(ctx, max_flags).map(|_| Value::Bool(true))?
        }
        Operation::SetSubmissionFee { fee } => {
            detector.set_submission_fee(ctx, Amount::from(fee)).map(|_| Value::Bool(true))?
        }
        Operation::SetMinStake { min_stake } => {
            detector.set_min_stake(ctx, Amount::from(min_stake)).map(|_| Value::Bool(true))?
        }
        Operation::SetVotingDuration { blocks } => {
            detector.set_voting_duration(ctx, blocks).map(|_| Value::Bool(true))?
        }
        Operation::SetConsensusThreshold { threshold } => {
            detector.set_consensus_threshold(ctx, threshold).map(|_| Value::Bool(true))?
        }
        Operation::SetSlashPercentage { percentage } => {
            detector.set_slash_percentage(ctx, percentage).map(|_| Value::Bool(true))?
        }
        Operation::SetRewardBonus { bonus } => {
            detector.set_reward_bonus(ctx, Amount::from(bonus)).map(|_| Value::Bool(true))?
        }
        Operation::SetScoreBounds { min, max } => {
            detector.set_score_bounds(ctx, min, max).map(|_| Value::Bool(true))?
        }
        Operation::SubmitFlag(request) => Value::from(detector.submit_flag(ctx, request)?),
        Operation::UpdateFlag { flag_id, score, reason } => {
            detector.update_flag(ctx, flag_id, score, reason).map(|_| Value::Bool(true))?
        }
        Operation::StakeAndVote { flag_id, vote, amount } => {
            amount_value(detector.stake_and_vote(ctx, flag_id, vote, Amount::from(amount))?)
        }
        Operation::LockStake { flag_id, amount } => {
            amount_value(detector.lock_stake(ctx, flag_id, Amount::from(amount))?)
        }
        Operation::FinalizeFlag { flag_id } => {
            Value::String(detector.finalize_flag(ctx, flag_id)?.as_str().to_string())
        }
        Operation::CreateProposal { description, new_threshold, expiry } => {
            Value::from(detector.create_proposal(ctx, description, new_threshold, expiry)?)
        }
        Operation::VoteOnProposal { proposal_id, support } => {
            Value::Bool(detector.vote_on_proposal(ctx, proposal_id, support)?)
        }
    };
    Ok(value)
}

/// Replay `scenario` step by step. Step failures are part of the report;
/// only an invalid starting configuration aborts the run.
pub fn run(scenario: &Scenario, config: DetectorConfig) -> Result<ScenarioReport, DetectorError> {
    let ledger = Arc::new(InMemoryLedger::new());
    for (account, balance) in &scenario.accounts {
        ledger.mint(account, Amount::from(*balance));
    }
    let roles = Arc::new(StaticRoles::with_members(
        scenario.oracles.iter().cloned(),
        scenario.authorities.iter().cloned(),
    ));

    let mut detector = Detector::new(config, ledger.clone(), roles)?;
    if let Some(escrow) = &scenario.escrow {
        detector = detector.with_escrow(escrow.clone());
    }

    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let ctx = CallContext::new(step.caller.clone(), step.height);
        let op = step.op.name();
        let result = apply(&detector, &ctx, step.op.clone());
        outcomes.push(StepOutcome {
            step: index,
            op,
            caller: step.caller.clone(),
            height: step.height,
            ok: result.is_ok(),
            error: result.as_ref().err().map(ErrorReport::from),
            value: result.ok(),
        });
    }

    let mut balances: BTreeMap<Principal, Amount> = scenario
        .accounts
        .keys()
        .map(|account| (account.clone(), ledger.balance(account)))
        .collect();
    let escrow = detector.escrow();
    balances.insert(escrow.clone(), ledger.balance(&escrow));

    let succeeded = outcomes.iter().filter(|o| o.ok).count();
    let config = detector.config();
    let summary = ScenarioSummary {
        steps: outcomes.len(),
        succeeded,
        failed: outcomes.len() - succeeded,
        anomaly_threshold: config.anomaly_threshold,
        config_version: config.version,
        flags: detector.flags(),
        balances,
    };
    Ok(ScenarioReport { outcomes, summary })
}
