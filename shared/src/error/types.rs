//! Classified error value

use super::kind::{ErrorKind, PreconditionKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest raw message kept for display
pub const MAX_RAW_MESSAGE_LEN: usize = 100;

/// A failure after classification: the kind plus the (bounded) raw cause
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", self.display_message())]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Underlying message, truncated to [`MAX_RAW_MESSAGE_LEN`] characters
    pub raw: Option<String>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, raw: None }
    }

    pub fn with_raw(kind: ErrorKind, raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        Self {
            kind,
            raw: (!raw.is_empty()).then(|| truncate_message(raw)),
        }
    }

    pub fn precondition(kind: PreconditionKind) -> Self {
        Self::new(ErrorKind::PreconditionViolated(kind))
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    /// Message for the player; unknown errors show the raw cause
    pub fn display_message(&self) -> String {
        match (&self.kind, &self.raw) {
            (ErrorKind::Unknown, Some(raw)) => raw.clone(),
            (kind, _) => kind.message(),
        }
    }
}

/// Bound a message to [`MAX_RAW_MESSAGE_LEN`] characters, marking the cut with `...`
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_RAW_MESSAGE_LEN {
        return message.to_string();
    }
    let kept: String = message.chars().take(MAX_RAW_MESSAGE_LEN - 3).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_message_kept() {
        assert_eq!(truncate_message("boom"), "boom");
    }

    #[test]
    fn test_long_message_truncated() {
        let long = "x".repeat(250);
        let t = truncate_message(&long);
        assert_eq!(t.chars().count(), MAX_RAW_MESSAGE_LEN);
        assert!(t.ends_with("..."));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let long = "é".repeat(150);
        let t = truncate_message(&long);
        assert_eq!(t.chars().count(), MAX_RAW_MESSAGE_LEN);
    }

    #[test]
    fn test_unknown_displays_raw() {
        let err = ClassifiedError::with_raw(ErrorKind::Unknown, "weird provider failure");
        assert_eq!(err.to_string(), "weird provider failure");
        assert_eq!(err.code(), 9001);
    }

    #[test]
    fn test_known_kind_displays_message() {
        let err = ClassifiedError::precondition(PreconditionKind::Allowance);
        assert_eq!(err.to_string(), "Token approval needed. Click Approve first.");
        assert_eq!(err.raw, None);
    }

    #[test]
    fn test_blank_raw_dropped() {
        let err = ClassifiedError::with_raw(ErrorKind::Timeout, "   ");
        assert_eq!(err.raw, None);
    }
}
