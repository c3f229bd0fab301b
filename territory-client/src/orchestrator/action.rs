//! Action lifecycle types

use crate::ledger::TxHandle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::error::{ClassifiedError, ErrorKind, PreconditionKind};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// User-facing write action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Approve,
    Deposit,
    Spawn,
    Move,
    Fortify,
    Attack,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deposit => "deposit",
            Self::Spawn => "spawn",
            Self::Move => "move",
            Self::Fortify => "fortify",
            Self::Attack => "attack",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a write
///
/// `Idle -> Submitted -> Confirming -> {Confirmed | Failed | Cancelled}`;
/// a wallet refusal goes straight from `Submitted` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Idle,
    /// Handed to the wallet for signing and broadcast
    Submitted,
    /// Broadcast, waiting for finality
    Confirming,
    Confirmed,
    Failed,
    /// Stopped waiting; the write may still settle
    Cancelled,
}

impl ActionState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitted | Self::Confirming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Cancelled)
    }
}

/// Terminal result of a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ActionOutcome {
    Success { block: u64 },
    Failure { error: ClassifiedError },
    /// The wait ended before finality was observed
    FinalityUnknown { timed_out: bool },
}

/// The write currently tracked by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingAction {
    pub id: Uuid,
    pub kind: ActionKind,
    pub state: ActionState,
    /// Ledger-assigned once the wallet accepted the write
    pub handle: Option<TxHandle>,
    pub submitted_at: DateTime<Utc>,
    pub result: Option<ActionOutcome>,
}

impl PendingAction {
    pub(crate) fn submitted(kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            state: ActionState::Submitted,
            handle: None,
            submitted_at: Utc::now(),
            result: None,
        }
    }

    /// Only the wait for finality can be cancelled
    pub fn cancellable(&self) -> bool {
        self.state == ActionState::Confirming
    }
}

/// Confirmed write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReceipt {
    pub id: Uuid,
    pub kind: ActionKind,
    pub handle: TxHandle,
    pub block: u64,
}

/// Why an action did not confirm
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// Another write is submitted or confirming
    #[error("{0} already in progress")]
    Busy(ActionKind),

    /// Refused locally, nothing was submitted
    #[error("{}", .0.message())]
    Precondition(PreconditionKind),

    /// Wallet refusal, transport failure or ledger revert
    #[error("{0}")]
    Failed(ClassifiedError),

    /// Submitted, but finality was not observed
    #[error("transaction {handle} not confirmed locally")]
    NotConfirmed { handle: TxHandle, timed_out: bool },
}

impl ActionError {
    /// Position in the closed user-facing taxonomy
    pub fn classified(&self) -> ClassifiedError {
        match self {
            Self::Busy(kind) => ClassifiedError::with_raw(
                ErrorKind::Unknown,
                format!("Another action is in progress ({}). Wait for it to finish.", kind),
            ),
            Self::Precondition(kind) => ClassifiedError::precondition(*kind),
            Self::Failed(error) => error.clone(),
            Self::NotConfirmed { timed_out: true, .. } => ClassifiedError::new(ErrorKind::Timeout),
            Self::NotConfirmed { handle, .. } => ClassifiedError::with_raw(
                ErrorKind::UserCancelled,
                format!("Stopped waiting for {}; it may still confirm", handle),
            ),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.classified().kind
    }
}
