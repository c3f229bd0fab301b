//! Error category classification

use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 1xxx: Wallet errors (signing, fee funds)
/// - 2xxx: Network errors (transport, chain, timeouts)
/// - 3xxx: Precondition errors (caught before submission)
/// - 4xxx: Ledger errors (reverts)
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Wallet,
    Network,
    Precondition,
    Ledger,
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            1000..2000 => Self::Wallet,
            2000..3000 => Self::Network,
            3000..4000 => Self::Precondition,
            4000..5000 => Self::Ledger,
            _ => Self::System,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Network => "network",
            Self::Precondition => "precondition",
            Self::Ledger => "ledger",
            Self::System => "system",
        }
    }

    /// Whether the same request may succeed if the player simply tries again
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network)
    }
}
