//! Action orchestrator
//!
//! One entry point per user action. Each call:
//! 1. checks the busy slot and the local preconditions against the latest
//!    snapshot, and claims the slot, under a single lock
//! 2. hands the write to the wallet (`Submitted`)
//! 3. polls for the receipt (`Confirming`), cancellable through
//!    [`ActionOrchestrator::cancel_wait`] or the confirmation timeout
//! 4. on a confirmed or failed write refreshes the snapshot, then frees the slot
//!
//! The slot is held by a guard: dropping an action future mid-flight frees
//! it and reports the write as not confirmed locally.
//!
//! Writes are never queued and never retried.

mod action;

pub use action::{ActionError, ActionKind, ActionOutcome, ActionReceipt, ActionState, PendingAction};

use crate::classifier;
use crate::config::{ClientConfig, Fees, MIN_INTERVAL};
use crate::ledger::{GameCall, Ledger, Receipt, TxHandle};
use crate::snapshot::{Bindings, Snapshot, SnapshotCache};
use crate::ClientError;
use shared::combat::MIN_ATTACK_UNITS;
use shared::error::PreconditionKind;
use shared::models::{Address, Amount, LocationId, UnitLevel, is_adjacent};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Addresses, fees and timings the orchestrator writes with
#[derive(Debug, Clone)]
pub struct ActionSettings {
    pub gold: Address,
    pub game_master: Address,
    pub bindings: Bindings,
    pub unit_level: UnitLevel,
    pub unit_gold_cost: u64,
    pub fees: Fees,
    pub confirmation_poll: Duration,
    pub confirmation_timeout: Option<Duration>,
}

impl ActionSettings {
    pub fn new(config: &ClientConfig, bindings: Bindings) -> Self {
        Self {
            gold: config.contracts.gold,
            game_master: config.contracts.game_master,
            bindings,
            unit_level: config.unit_level,
            unit_gold_cost: config.unit_gold_cost,
            fees: config.fees,
            confirmation_poll: config.confirmation_poll,
            confirmation_timeout: config.confirmation_timeout,
        }
    }
}

struct InFlight {
    id: Uuid,
    kind: ActionKind,
    cancel: CancellationToken,
    /// Receipt observed or write failed; only the refresh remains
    settling: bool,
}

enum Wait {
    Final(Receipt),
    Cancelled,
    TimedOut,
}

/// Sequences writes against the ledger, at most one in flight
pub struct ActionOrchestrator {
    ledger: Arc<dyn Ledger>,
    cache: SnapshotCache,
    settings: ActionSettings,
    slot: Mutex<Option<InFlight>>,
    state_tx: watch::Sender<Option<PendingAction>>,
}

impl ActionOrchestrator {
    pub fn new(ledger: Arc<dyn Ledger>, cache: SnapshotCache, settings: ActionSettings) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            ledger,
            cache,
            settings,
            slot: Mutex::new(None),
            state_tx,
        }
    }

    // ========== Actions ==========

    /// Let the game master pull `amount` Gold from the wallet
    pub async fn approve(&self, amount: Amount) -> Result<ActionReceipt, ActionError> {
        let call = GameCall::Approve {
            token: self.settings.gold,
            spender: self.settings.game_master,
            amount,
        };
        self.execute(ActionKind::Approve, |_| Ok(()), call, Amount::ZERO).await
    }

    /// Move wallet Gold into escrow; needs a covering allowance
    pub async fn deposit(&self, amount: Amount) -> Result<ActionReceipt, ActionError> {
        let call = GameCall::Deposit {
            token: self.settings.gold,
            amount,
        };
        let check = |snapshot: &Snapshot| {
            if amount.is_zero() {
                return Err(PreconditionKind::PositiveAmount);
            }
            match snapshot.allowance.get() {
                Some(allowance) if allowance >= amount => Ok(()),
                _ => Err(PreconditionKind::Allowance),
            }
        };
        self.execute(ActionKind::Deposit, check, call, Amount::ZERO).await
    }

    /// Spend escrowed Gold on `units` units at `location`
    pub async fn spawn(&self, location: LocationId, units: u64) -> Result<ActionReceipt, ActionError> {
        let call = GameCall::Spawn {
            location,
            level: self.settings.unit_level,
            units,
        };
        let unit_gold_cost = self.settings.unit_gold_cost;
        let check = move |snapshot: &Snapshot| {
            if units == 0 {
                return Err(PreconditionKind::PositiveAmount);
            }
            let cost = Amount::from_units(unit_gold_cost).checked_mul_units(units);
            if let (Some(escrow), Some(cost)) = (snapshot.escrow_gold.get(), cost) {
                if escrow < cost {
                    tracing::warn!(
                        action = "spawn",
                        units,
                        escrow = escrow.whole_units(),
                        cost = cost.whole_units(),
                        "Escrowed Gold looks insufficient, submitting anyway"
                    );
                }
            }
            Ok(())
        };
        self.execute(ActionKind::Spawn, check, call, self.settings.fees.spawn_fee)
            .await
    }

    /// Move the player to an adjacent location
    pub async fn move_to(&self, from: LocationId, to: LocationId) -> Result<ActionReceipt, ActionError> {
        let call = GameCall::Move { from, to };
        let check = |_: &Snapshot| {
            if is_adjacent(from, to) {
                Ok(())
            } else {
                Err(PreconditionKind::Adjacency)
            }
        };
        self.execute(ActionKind::Move, check, call, self.settings.fees.move_fee)
            .await
    }

    /// Deploy escrowed units into the garrison of an owned location
    pub async fn fortify(&self, location: LocationId, units: u64) -> Result<ActionReceipt, ActionError> {
        let call = GameCall::Fortify {
            garrison: self.settings.bindings.garrison,
            location,
            token: self.settings.bindings.unit_token,
            units,
        };
        let check = |snapshot: &Snapshot| {
            if units == 0 {
                return Err(PreconditionKind::PositiveAmount);
            }
            match (snapshot.player, snapshot.owner_of(location)) {
                (Some(player), Some(Some(owner))) if owner == player => Ok(()),
                _ => Err(PreconditionKind::Ownership),
            }
        };
        self.execute(ActionKind::Fortify, check, call, Amount::ZERO).await
    }

    /// Attack a location with escrowed units
    pub async fn attack(&self, location: LocationId, units: u64) -> Result<ActionReceipt, ActionError> {
        let call = GameCall::Attack {
            location,
            token: self.settings.bindings.unit_token,
            units,
        };
        let check = |_: &Snapshot| {
            if units >= MIN_ATTACK_UNITS {
                Ok(())
            } else {
                Err(PreconditionKind::MinimumAttackSize)
            }
        };
        self.execute(ActionKind::Attack, check, call, self.settings.fees.attack_fee)
            .await
    }

    // ========== Lifecycle ==========

    /// Stop waiting for the confirming write.
    ///
    /// Returns false unless a write is `Confirming` with no receipt observed
    /// yet. The write itself is not recalled and may still settle.
    pub fn cancel_wait(&self) -> bool {
        let slot = self.lock_slot();
        let confirming = self.state_tx.borrow().as_ref().is_some_and(|p| {
            p.cancellable() && slot.as_ref().is_some_and(|f| f.id == p.id && !f.settling)
        });
        match slot.as_ref() {
            Some(in_flight) if confirming => {
                tracing::info!(action = %in_flight.kind, id = %in_flight.id, "Cancelling finality wait");
                in_flight.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Latest tracked write, including its terminal state
    pub fn current(&self) -> Option<PendingAction> {
        self.state_tx.borrow().clone()
    }

    /// Receiver notified on every lifecycle transition
    pub fn watch(&self) -> watch::Receiver<Option<PendingAction>> {
        self.state_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.lock_slot().is_some()
    }

    async fn execute<F>(
        &self,
        kind: ActionKind,
        check: F,
        call: GameCall,
        value: Amount,
    ) -> Result<ActionReceipt, ActionError>
    where
        F: FnOnce(&Snapshot) -> Result<(), PreconditionKind>,
    {
        let mut claim = self.begin(kind, check)?;

        let handle = match self.ledger.submit(&call, value).await {
            Ok(handle) => handle,
            Err(error) => return Err(self.fail(claim, &error).await),
        };

        claim.pending.state = ActionState::Confirming;
        claim.pending.handle = Some(handle.clone());
        tracing::info!(action = %kind, id = %claim.pending.id, handle = %handle, "Waiting for finality");
        claim.publish();

        match self.await_finality(&handle, &claim.cancel).await {
            Wait::Final(receipt) if receipt.success => {
                tracing::info!(action = %kind, handle = %handle, block = receipt.block, "Action confirmed");
                claim.settle(ActionState::Confirmed, ActionOutcome::Success { block: receipt.block });
                self.cache.invalidate_now().await;
                let pending = claim.release();
                Ok(ActionReceipt {
                    id: pending.id,
                    kind,
                    handle,
                    block: receipt.block,
                })
            }
            Wait::Final(receipt) => {
                let error = ClientError::Reverted {
                    reason: receipt.revert_reason,
                };
                Err(self.fail(claim, &error).await)
            }
            Wait::Cancelled => Err(self.abandon(claim, handle, false)),
            Wait::TimedOut => Err(self.abandon(claim, handle, true)),
        }
    }

    /// Busy check, precondition check and slot claim, with no suspension point
    fn begin<F>(&self, kind: ActionKind, check: F) -> Result<Claim<'_>, ActionError>
    where
        F: FnOnce(&Snapshot) -> Result<(), PreconditionKind>,
    {
        let mut slot = self.lock_slot();
        if let Some(in_flight) = slot.as_ref() {
            tracing::debug!(action = %kind, busy = %in_flight.kind, "Rejected, another action in flight");
            return Err(ActionError::Busy(in_flight.kind));
        }

        let snapshot = self.cache.current();
        if let Err(precondition) = check(&*snapshot) {
            tracing::info!(
                action = %kind,
                precondition = precondition.name(),
                version = snapshot.version,
                "Refused locally"
            );
            return Err(ActionError::Precondition(precondition));
        }

        let pending = PendingAction::submitted(kind);
        let cancel = CancellationToken::new();
        *slot = Some(InFlight {
            id: pending.id,
            kind,
            cancel: cancel.clone(),
            settling: false,
        });
        drop(slot);

        tracing::info!(action = %kind, id = %pending.id, "Submitted to wallet");
        let claim = Claim {
            orchestrator: self,
            pending,
            cancel,
            released: false,
        };
        claim.publish();
        Ok(claim)
    }

    async fn await_finality(&self, handle: &TxHandle, cancel: &CancellationToken) -> Wait {
        let poll = async {
            let mut ticker = tokio::time::interval(self.settings.confirmation_poll.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.ledger.receipt(handle).await {
                    Ok(Some(receipt)) => break receipt,
                    Ok(None) => {}
                    Err(e) => tracing::warn!(handle = %handle, error = %e, "Receipt poll failed"),
                }
            }
        };
        let deadline = async {
            match self.settings.confirmation_timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Wait::Cancelled,
            _ = deadline => Wait::TimedOut,
            receipt = poll => Wait::Final(receipt),
        }
    }

    async fn fail(&self, mut claim: Claim<'_>, error: &ClientError) -> ActionError {
        let classified = classifier::classify(error);
        tracing::error!(
            action = %claim.pending.kind,
            id = %claim.pending.id,
            kind = classified.kind.name(),
            error = %error,
            "Action failed"
        );
        claim.settle(
            ActionState::Failed,
            ActionOutcome::Failure {
                error: classified.clone(),
            },
        );
        self.cache.invalidate_now().await;
        claim.release();
        ActionError::Failed(classified)
    }

    fn abandon(&self, mut claim: Claim<'_>, handle: TxHandle, timed_out: bool) -> ActionError {
        tracing::warn!(
            action = %claim.pending.kind,
            handle = %handle,
            timed_out,
            "Stopped waiting, finality unknown"
        );
        claim.settle(ActionState::Cancelled, ActionOutcome::FinalityUnknown { timed_out });
        claim.release();
        ActionError::NotConfirmed { handle, timed_out }
    }

    /// Publish the terminal state and free the slot
    fn finish(&self, pending: PendingAction) {
        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(|f| f.id == pending.id) {
            *slot = None;
        }
        self.state_tx.send_replace(Some(pending));
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Claimed busy slot of one write.
///
/// Dropped before [`Claim::release`] (the action future was dropped or
/// panicked), it frees the slot and reports the write as `Cancelled` with
/// unknown finality, unless a terminal state was already settled.
struct Claim<'a> {
    orchestrator: &'a ActionOrchestrator,
    pending: PendingAction,
    cancel: CancellationToken,
    released: bool,
}

impl Claim<'_> {
    fn publish(&self) {
        self.orchestrator.state_tx.send_replace(Some(self.pending.clone()));
    }

    /// Record the terminal state; the wait can no longer be cancelled
    fn settle(&mut self, state: ActionState, outcome: ActionOutcome) {
        self.pending.state = state;
        self.pending.result = Some(outcome);
        if let Some(in_flight) = self.orchestrator.lock_slot().as_mut() {
            if in_flight.id == self.pending.id {
                in_flight.settling = true;
            }
        }
    }

    fn release(mut self) -> PendingAction {
        self.released = true;
        self.orchestrator.finish(self.pending.clone());
        self.pending.clone()
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if !self.pending.state.is_terminal() {
            tracing::warn!(
                action = %self.pending.kind,
                id = %self.pending.id,
                state = ?self.pending.state,
                "Action dropped before settling, finality unknown"
            );
            self.pending.state = ActionState::Cancelled;
            self.pending.result = Some(ActionOutcome::FinalityUnknown { timed_out: false });
        }
        self.cancel.cancel();
        self.orchestrator.finish(self.pending.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerReader};
    use crate::snapshot::QueryPlan;
    use shared::error::ErrorKind;

    fn me() -> Address {
        Address::from_bytes([0x11; 20])
    }

    fn setup() -> (Arc<InMemoryLedger>, ActionOrchestrator) {
        let config = ClientConfig::default().with_player(me());
        let ledger = Arc::new(InMemoryLedger::new(&config));
        let bindings = Bindings {
            garrison: ledger.garrison_contract(),
            unit_token: ledger.unit_token(),
        };
        let reader: Arc<dyn LedgerReader> = ledger.clone();
        let cache = SnapshotCache::new(reader, QueryPlan::new(&config, bindings), Duration::from_secs(5));
        let orchestrator = ActionOrchestrator::new(ledger.clone(), cache, ActionSettings::new(&config, bindings));
        (ledger, orchestrator)
    }

    #[tokio::test]
    async fn test_attack_below_minimum_is_refused_locally() {
        let (ledger, orchestrator) = setup();
        let err = orchestrator.attack(LocationId::new(2), 24).await.unwrap_err();
        assert_eq!(err, ActionError::Precondition(PreconditionKind::MinimumAttackSize));
        assert!(ledger.submissions().is_empty());
        assert!(!orchestrator.is_busy());
        assert!(orchestrator.current().is_none());
    }

    #[tokio::test]
    async fn test_fortify_fails_closed_before_first_refresh() {
        let (ledger, orchestrator) = setup();
        ledger.set_location(LocationId::new(1), 30, Some(me()), 10);
        let err = orchestrator.fortify(LocationId::new(1), 5).await.unwrap_err();
        assert_eq!(err, ActionError::Precondition(PreconditionKind::Ownership));

        orchestrator.cache.refresh().await;
        let err = orchestrator.fortify(LocationId::new(1), 0).await.unwrap_err();
        assert_eq!(err, ActionError::Precondition(PreconditionKind::PositiveAmount));
    }

    #[tokio::test]
    async fn test_confirmed_action_refreshes_snapshot() {
        let (ledger, orchestrator) = setup();
        let receipt = orchestrator.approve(Amount::MAX).await.unwrap();
        assert_eq!(receipt.kind, ActionKind::Approve);
        assert_eq!(ledger.submissions().len(), 1);

        let snapshot = orchestrator.cache.current();
        assert_eq!(snapshot.allowance.get(), Some(Amount::MAX));
        let current = orchestrator.current().unwrap();
        assert_eq!(current.state, ActionState::Confirmed);
        assert_eq!(current.handle, Some(receipt.handle));
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_reverted_write_is_ledger_rejected() {
        let (ledger, orchestrator) = setup();
        // 1 -> 2 is adjacent locally, but the player sits elsewhere on the ledger
        ledger.set_player_location(me(), LocationId::new(4));
        let err = orchestrator
            .move_to(LocationId::new(1), LocationId::new(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LedgerRejected(Some("not at location".into())));
        assert_eq!(orchestrator.current().unwrap().state, ActionState::Failed);
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_cancel_wait_without_confirming_action() {
        let (_ledger, orchestrator) = setup();
        assert!(!orchestrator.cancel_wait());
    }

    #[tokio::test]
    async fn test_zero_confirmation_poll_still_confirms() {
        let (ledger, base) = setup();
        let mut settings = base.settings.clone();
        settings.confirmation_poll = Duration::ZERO;
        let orchestrator = ActionOrchestrator::new(ledger.clone(), base.cache.clone(), settings);

        orchestrator.approve(Amount::MAX).await.unwrap();
        assert_eq!(orchestrator.current().unwrap().state, ActionState::Confirmed);
        assert!(!orchestrator.is_busy());
    }
}
