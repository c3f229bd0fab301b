//! Data models
//!
//! Read models for ledger state. The ledger is authoritative; these are
//! copies the client refreshes and never writes back.

pub mod address;
pub mod amount;
pub mod location;
pub mod player;

// Re-exports
pub use address::*;
pub use amount::*;
pub use location::*;
pub use player::*;
