// Threshold governance and authority administration for Flagwatch.
pub mod proposals;
pub mod admin;

pub use proposals::{ProposalBook, PROPOSAL_APPROVAL_MARGIN};
pub use admin::Administration;
