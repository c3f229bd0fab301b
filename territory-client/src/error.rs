//! Client error types

use thiserror::Error;

/// JSON-RPC error code wallets use for "user rejected the request"
pub const USER_REJECTED_CODE: i64 = 4001;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON-RPC error object returned by the node or wallet provider
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<String>,
    },

    /// Call reverted on the ledger
    #[error("execution reverted{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Reverted { reason: Option<String> },

    /// Ledger endpoint could not be reached
    #[error("Ledger unreachable: {0}")]
    Unreachable(String),

    /// Connected to a different chain than configured
    #[error("chain mismatch: expected {expected}, connected to {actual}")]
    WrongNetwork { expected: u64, actual: u64 },

    /// Request did not complete in time
    #[error("request timed out")]
    Timeout,

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Wallet reported that the user declined to sign
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }
}

impl From<tokio::time::error::Elapsed> for ClientError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverted_display() {
        let err = ClientError::Reverted {
            reason: Some("not adjacent".into()),
        };
        assert_eq!(err.to_string(), "execution reverted: not adjacent");
        let err = ClientError::Reverted { reason: None };
        assert_eq!(err.to_string(), "execution reverted");
    }

    #[test]
    fn test_user_rejection_code() {
        let err = ClientError::Rpc {
            code: 4001,
            message: "User rejected the request.".into(),
            data: None,
        };
        assert!(err.is_user_rejection());
        assert!(!ClientError::Timeout.is_user_rejection());
    }
}
