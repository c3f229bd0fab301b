//! Error kinds shown to the player

use super::category::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Locally checkable action precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreconditionKind {
    /// Move target is not next to the origin
    Adjacency,
    /// Deposit exceeds the approved allowance
    Allowance,
    /// Attack below the minimum unit count
    MinimumAttackSize,
    /// Player does not own the location
    Ownership,
    /// Amount must be greater than zero
    PositiveAmount,
}

impl PreconditionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Adjacency => "adjacency",
            Self::Allowance => "allowance",
            Self::MinimumAttackSize => "minimum_attack_size",
            Self::Ownership => "ownership",
            Self::PositiveAmount => "positive_amount",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Adjacency => {
                "Cannot move: locations are not adjacent. Check the map connections."
            }
            Self::Allowance => "Token approval needed. Click Approve first.",
            Self::MinimumAttackSize => "Minimum 25 units required to attack.",
            Self::Ownership => "You don't own this location. Capture it first.",
            Self::PositiveAmount => "Amount must be greater than zero.",
        }
    }
}

impl fmt::Display for PreconditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed set of failure kinds
///
/// Codes follow the same range convention as the category:
/// - 1xxx: wallet
/// - 2xxx: network
/// - 3xxx: precondition
/// - 4xxx: ledger
/// - 9xxx: unknown
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ErrorKind {
    UserCancelled,
    InsufficientGasFunds,
    NetworkUnreachable,
    WrongNetwork,
    PreconditionViolated(PreconditionKind),
    /// Revert, with the reason string when the ledger supplied one
    LedgerRejected(Option<String>),
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub fn code(&self) -> u16 {
        match self {
            Self::UserCancelled => 1001,
            Self::InsufficientGasFunds => 1002,
            Self::NetworkUnreachable => 2001,
            Self::WrongNetwork => 2002,
            Self::Timeout => 2003,
            Self::PreconditionViolated(kind) => match kind {
                PreconditionKind::Adjacency => 3001,
                PreconditionKind::Allowance => 3002,
                PreconditionKind::MinimumAttackSize => 3003,
                PreconditionKind::Ownership => 3004,
                PreconditionKind::PositiveAmount => 3005,
            },
            Self::LedgerRejected(_) => 4001,
            Self::Unknown => 9001,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }

    /// Stable snake_case name
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserCancelled => "user_cancelled",
            Self::InsufficientGasFunds => "insufficient_gas_funds",
            Self::NetworkUnreachable => "network_unreachable",
            Self::WrongNetwork => "wrong_network",
            Self::PreconditionViolated(_) => "precondition_violated",
            Self::LedgerRejected(_) => "ledger_rejected",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Player-facing message
    pub fn message(&self) -> String {
        match self {
            Self::UserCancelled => "Transaction cancelled by user".to_string(),
            Self::InsufficientGasFunds => {
                "Insufficient tBNB for gas fees. Get more from the faucet.".to_string()
            }
            Self::NetworkUnreachable => "Network error. Check your internet connection.".to_string(),
            Self::WrongNetwork => "Wrong network. Switch to opBNB Testnet (5611).".to_string(),
            Self::PreconditionViolated(kind) => kind.message().to_string(),
            Self::LedgerRejected(Some(reason)) => format!("Transaction failed: {}", reason),
            Self::LedgerRejected(None) => {
                "Transaction failed. Check your inputs and try again.".to_string()
            }
            Self::Timeout => "Request timed out. Try again.".to_string(),
            Self::Unknown => "Unknown error occurred".to_string(),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreconditionViolated(kind) => write!(f, "precondition_violated({})", kind),
            Self::LedgerRejected(Some(reason)) => write!(f, "ledger_rejected({})", reason),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_categories() {
        assert_eq!(ErrorKind::UserCancelled.category(), ErrorCategory::Wallet);
        assert_eq!(ErrorKind::InsufficientGasFunds.category(), ErrorCategory::Wallet);
        assert_eq!(ErrorKind::WrongNetwork.category(), ErrorCategory::Network);
        assert_eq!(ErrorKind::Timeout.category(), ErrorCategory::Network);
        assert_eq!(
            ErrorKind::PreconditionViolated(PreconditionKind::Ownership).category(),
            ErrorCategory::Precondition
        );
        assert_eq!(ErrorKind::LedgerRejected(None).category(), ErrorCategory::Ledger);
        assert_eq!(ErrorKind::Unknown.category(), ErrorCategory::System);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorKind::PreconditionViolated(PreconditionKind::Allowance).to_string(),
            "precondition_violated(allowance)"
        );
        assert_eq!(
            ErrorKind::LedgerRejected(Some("not adjacent".into())).to_string(),
            "ledger_rejected(not adjacent)"
        );
        assert_eq!(ErrorKind::LedgerRejected(None).to_string(), "ledger_rejected");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_serialize_tagged() {
        let json = serde_json::to_value(ErrorKind::PreconditionViolated(
            PreconditionKind::MinimumAttackSize,
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "precondition_violated", "detail": "minimum_attack_size"})
        );
        let json = serde_json::to_value(ErrorKind::UserCancelled).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "user_cancelled"}));
    }
}
