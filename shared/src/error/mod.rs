//! Error taxonomy for game actions
//!
//! This module provides the closed set of failures the player can see:
//! - [`ErrorKind`]: what went wrong, with a stable code and message
//! - [`PreconditionKind`]: which local check refused an action
//! - [`ErrorCategory`]: classification of kinds by code range
//! - [`ClassifiedError`]: a kind plus the bounded raw cause
//!
//! # Error Code Ranges
//!
//! - 1xxx: Wallet errors
//! - 2xxx: Network errors
//! - 3xxx: Precondition errors
//! - 4xxx: Ledger errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{ClassifiedError, ErrorKind, PreconditionKind};
//!
//! let err = ClassifiedError::precondition(PreconditionKind::Allowance);
//! assert_eq!(err.kind, ErrorKind::PreconditionViolated(PreconditionKind::Allowance));
//! assert_eq!(err.code(), 3002);
//! ```

mod category;
mod kind;
mod types;

pub use category::ErrorCategory;
pub use kind::{ErrorKind, PreconditionKind};
pub use types::{ClassifiedError, MAX_RAW_MESSAGE_LEN, truncate_message};
