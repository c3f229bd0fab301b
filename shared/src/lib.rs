//! Shared types for the Territory game client
//!
//! Pure domain types used by the client crate: ledger addresses and
//! fixed-point amounts, the static map, player read models, the combat
//! model and the error taxonomy. Nothing in here does I/O.

pub mod combat;
pub mod error;
pub mod models;

// Re-exports
pub use combat::{BattleOutcome, BattlePreview, CombatPrediction, MIN_ATTACK_UNITS, predict};
pub use error::{ClassifiedError, ErrorCategory, ErrorKind, PreconditionKind};
pub use models::{Address, Amount, Location, LocationId, LocationStatus, Player, UnitLevel};
