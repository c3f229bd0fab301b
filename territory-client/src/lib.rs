//! Territory Client - action client for the onchain territory game
//!
//! Keeps a polled snapshot of ledger state, sequences wallet writes and
//! previews combat before an attack is paid for.

pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logger;
pub mod orchestrator;
pub mod snapshot;

pub use client::GameClient;
pub use config::{ClientConfig, ContractAddresses, Fees};
pub use error::{ClientError, ClientResult};
pub use ledger::{Finality, InMemoryLedger, Ledger, LedgerReader, LedgerWriter, RpcLedger};
pub use orchestrator::{
    ActionError, ActionKind, ActionOrchestrator, ActionOutcome, ActionReceipt, ActionState, PendingAction,
};
pub use snapshot::{PollingHandle, RefreshOutcome, Snapshot, SnapshotCache, Tracked};

// Re-export shared types for convenience
pub use shared::combat::{BattleOutcome, BattlePreview, CombatPrediction};
pub use shared::error::{ClassifiedError, ErrorKind, PreconditionKind};
pub use shared::models::{Address, Amount, Location, LocationId, LocationStatus};
