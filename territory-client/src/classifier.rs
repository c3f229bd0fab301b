//! Failure classification
//!
//! Maps transport, wallet and ledger failures onto the closed
//! [`ErrorKind`] taxonomy. Structured causes (RPC codes, reqwest error
//! flags, decoded reverts) are trusted first; free text from providers is
//! matched against an ordered pattern list where the first hit wins.

use crate::ClientError;
use shared::error::{ClassifiedError, ErrorKind, PreconditionKind};

/// Classify a transport or wallet error
pub fn classify(error: &ClientError) -> ClassifiedError {
    let raw = error.to_string();
    match error {
        ClientError::Rpc { .. } if error.is_user_rejection() => {
            ClassifiedError::with_raw(ErrorKind::UserCancelled, raw)
        }
        ClientError::Http(e) if e.is_timeout() => ClassifiedError::with_raw(ErrorKind::Timeout, raw),
        ClientError::Http(e) if e.is_connect() || e.is_request() => {
            ClassifiedError::with_raw(ErrorKind::NetworkUnreachable, raw)
        }
        ClientError::Unreachable(_) => ClassifiedError::with_raw(ErrorKind::NetworkUnreachable, raw),
        ClientError::Timeout => ClassifiedError::with_raw(ErrorKind::Timeout, raw),
        ClientError::WrongNetwork { .. } => ClassifiedError::with_raw(ErrorKind::WrongNetwork, raw),
        ClientError::Reverted { reason } => {
            ClassifiedError::with_raw(ErrorKind::LedgerRejected(reason.clone()), raw)
        }
        ClientError::Rpc { message, .. } => classify_message(message),
        _ => classify_message(&raw),
    }
}

/// Classify a free-text failure message
pub fn classify_message(message: &str) -> ClassifiedError {
    let message = message.trim();
    if message.is_empty() {
        return ClassifiedError::new(ErrorKind::Unknown);
    }
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let kind = if has(&["user rejected", "user denied", "rejected the request"]) {
        ErrorKind::UserCancelled
    } else if has(&["insufficient funds", "insufficient balance"]) {
        ErrorKind::InsufficientGasFunds
    } else if has(&["gas required exceeds", "out of gas"]) {
        ErrorKind::LedgerRejected(None)
    } else if has(&["wrong network", "network mismatch", "chain mismatch", "chain id", "chainid", "unsupported chain"]) {
        ErrorKind::WrongNetwork
    } else if has(&["network", "disconnected", "connection"]) {
        ErrorKind::NetworkUnreachable
    } else if has(&["not adjacent"]) {
        ErrorKind::PreconditionViolated(PreconditionKind::Adjacency)
    } else if has(&["insufficient gold", "not enough gold"]) {
        ErrorKind::LedgerRejected(Some("not enough Gold in escrow".into()))
    } else if has(&["insufficient units", "not enough units"]) {
        ErrorKind::LedgerRejected(Some("not enough units".into()))
    } else if lower.contains("minimum") && lower.contains("25") {
        ErrorKind::PreconditionViolated(PreconditionKind::MinimumAttackSize)
    } else if has(&["not owner", "unauthorized"]) {
        ErrorKind::PreconditionViolated(PreconditionKind::Ownership)
    } else if has(&["allowance", "approve"]) {
        ErrorKind::PreconditionViolated(PreconditionKind::Allowance)
    } else if has(&["reverted"]) {
        ErrorKind::LedgerRejected(extract_revert_reason(message))
    } else if has(&["timeout", "timed out"]) {
        ErrorKind::Timeout
    } else if has(&["nonce"]) {
        ErrorKind::LedgerRejected(Some("transaction nonce error, refresh and retry".into()))
    } else {
        ErrorKind::Unknown
    };

    ClassifiedError::with_raw(kind, message)
}

/// Pull the reason out of `reason="..."` or `execution reverted: ...`
pub fn extract_revert_reason(message: &str) -> Option<String> {
    if let Some((_, rest)) = message.split_once("reason=\"") {
        if let Some((reason, _)) = rest.split_once('"') {
            return Some(reason.to_string()).filter(|r| !r.is_empty());
        }
    }
    message
        .split_once("execution reverted: ")
        .map(|(_, rest)| rest.trim().trim_matches('"').to_string())
        .filter(|r| !r.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::error::MAX_RAW_MESSAGE_LEN;

    fn kind(message: &str) -> ErrorKind {
        classify_message(message).kind
    }

    #[test]
    fn test_wallet_patterns() {
        assert_eq!(kind("MetaMask Tx Signature: User denied transaction signature."), ErrorKind::UserCancelled);
        assert_eq!(kind("User rejected the request."), ErrorKind::UserCancelled);
        assert_eq!(
            kind("insufficient funds for gas * price + value"),
            ErrorKind::InsufficientGasFunds
        );
        assert_eq!(kind("out of gas"), ErrorKind::LedgerRejected(None));
    }

    #[test]
    fn test_wrong_network_checked_before_network() {
        assert_eq!(kind("network mismatch: expected 5611"), ErrorKind::WrongNetwork);
        assert_eq!(kind("The current chain id (1) does not match"), ErrorKind::WrongNetwork);
        assert_eq!(kind("network request failed"), ErrorKind::NetworkUnreachable);
        assert_eq!(kind("connection reset by peer"), ErrorKind::NetworkUnreachable);
    }

    #[test]
    fn test_precondition_patterns() {
        assert_eq!(
            kind("execution reverted: not adjacent"),
            ErrorKind::PreconditionViolated(PreconditionKind::Adjacency)
        );
        assert_eq!(
            kind("minimum 25 units required"),
            ErrorKind::PreconditionViolated(PreconditionKind::MinimumAttackSize)
        );
        assert_eq!(
            kind("Ownable: caller is not owner"),
            ErrorKind::PreconditionViolated(PreconditionKind::Ownership)
        );
        assert_eq!(
            kind("ERC20: insufficient allowance"),
            ErrorKind::PreconditionViolated(PreconditionKind::Allowance)
        );
    }

    #[test]
    fn test_revert_reasons() {
        assert_eq!(
            kind("transaction reverted with reason=\"location locked\" code=CALL_EXCEPTION"),
            ErrorKind::LedgerRejected(Some("location locked".into()))
        );
        assert_eq!(
            kind("execution reverted: cooldown active"),
            ErrorKind::LedgerRejected(Some("cooldown active".into()))
        );
        assert_eq!(kind("transaction reverted"), ErrorKind::LedgerRejected(None));
        assert_eq!(
            kind("insufficient gold"),
            ErrorKind::LedgerRejected(Some("not enough Gold in escrow".into()))
        );
    }

    #[test]
    fn test_timeout_and_nonce() {
        assert_eq!(kind("request timed out"), ErrorKind::Timeout);
        assert!(matches!(kind("nonce too low"), ErrorKind::LedgerRejected(Some(_))));
    }

    #[test]
    fn test_unknown_keeps_bounded_raw() {
        let long = format!("weird failure {}", "x".repeat(300));
        let err = classify_message(&long);
        assert_eq!(err.kind, ErrorKind::Unknown);
        let raw = err.raw.unwrap();
        assert_eq!(raw.chars().count(), MAX_RAW_MESSAGE_LEN);
        assert!(raw.starts_with("weird failure"));
        assert!(raw.ends_with("..."));
    }

    #[test]
    fn test_empty_message() {
        let err = classify_message("  ");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.to_string(), "Unknown error occurred");
    }

    #[test]
    fn test_structured_errors() {
        let rejected = ClientError::Rpc {
            code: 4001,
            message: "whatever the wallet says".into(),
            data: None,
        };
        assert_eq!(classify(&rejected).kind, ErrorKind::UserCancelled);

        let wrong = ClientError::WrongNetwork {
            expected: 5611,
            actual: 56,
        };
        assert_eq!(classify(&wrong).kind, ErrorKind::WrongNetwork);

        assert_eq!(classify(&ClientError::Timeout).kind, ErrorKind::Timeout);
        assert_eq!(
            classify(&ClientError::Unreachable("refused".into())).kind,
            ErrorKind::NetworkUnreachable
        );

        let reverted = ClientError::Reverted {
            reason: Some("not adjacent".into()),
        };
        assert_eq!(
            classify(&reverted).kind,
            ErrorKind::LedgerRejected(Some("not adjacent".into()))
        );

        let rpc = ClientError::Rpc {
            code: -32000,
            message: "nonce too low".into(),
            data: None,
        };
        assert!(matches!(classify(&rpc).kind, ErrorKind::LedgerRejected(Some(_))));
    }

    #[test]
    fn test_extract_revert_reason() {
        assert_eq!(extract_revert_reason("reason=\"x\""), Some("x".into()));
        assert_eq!(extract_revert_reason("reason=\"\""), None);
        assert_eq!(extract_revert_reason("execution reverted: \"y\""), Some("y".into()));
        assert_eq!(extract_revert_reason("reverted"), None);
    }
}
