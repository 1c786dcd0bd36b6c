// Flagwatch: stake-weighted validation of anomalous transaction flags.
pub mod engine;
pub mod scenario;
pub mod settings;

pub use engine::Detector;
pub use scenario::{run as run_scenario, Scenario, ScenarioReport};
pub use settings::{Settings, SettingsError};

pub use flagwatch_consensus::{SettlementRecord, SubmitFlagRequest};
pub use flagwatch_core::{
    Amount, CallContext, DetectorConfig, DetectorError, ErrorKind, Flag, FlagStatus,
    InMemoryLedger, Principal, StaticRoles, TokenLedger,
};
