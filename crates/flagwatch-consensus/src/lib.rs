// Flag lifecycle and stake-weighted consensus for Flagwatch.
pub mod submission;
pub mod stake_voting;
pub mod settlement;
pub mod finalizer;

pub use submission::{FlagSubmission, SubmitFlagRequest};
pub use stake_voting::StakeVoting;
pub use settlement::{
    consensus_reached, payout_amount, percentage_of, FailedPayout, Payout, Refund,
    SettlementRecord,
};
pub use finalizer::ConsensusFinalizer;
