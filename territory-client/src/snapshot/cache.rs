//! Snapshot cache and polling loop

use super::Snapshot;
use crate::classifier;
use crate::config::{ClientConfig, MIN_INTERVAL};
use crate::ledger::{LedgerReader, ReadQuery, ReadValue};
use crate::{ClientError, ClientResult};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use shared::models::{ALL_LOCATIONS, Address, LocationId, UnitLevel};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Contract addresses resolved at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    pub garrison: Address,
    /// ERC20 token of the tracked unit level
    pub unit_token: Address,
}

/// Snapshot field a query result lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Owner(LocationId),
    BasePower(LocationId),
    Garrison(LocationId),
    PlayerLocation,
    WalletGold,
    EscrowGold,
    EscrowUnits,
    Allowance,
}

/// The fixed set of reads one refresh issues
#[derive(Debug, Clone)]
pub struct QueryPlan {
    player: Option<Address>,
    gold: Address,
    game_master: Address,
    unit_level: UnitLevel,
    bindings: Bindings,
}

impl QueryPlan {
    pub fn new(config: &ClientConfig, bindings: Bindings) -> Self {
        Self {
            player: config.player,
            gold: config.contracts.gold,
            game_master: config.contracts.game_master,
            unit_level: config.unit_level,
            bindings,
        }
    }

    pub fn bindings(&self) -> Bindings {
        self.bindings
    }

    fn queries(&self) -> Vec<(Field, ReadQuery)> {
        let mut queries = Vec::with_capacity(ALL_LOCATIONS.len() * 3 + 5);
        for location in ALL_LOCATIONS {
            queries.push((Field::Owner(location), ReadQuery::LocationOwner { location }));
            queries.push((Field::BasePower(location), ReadQuery::LocationBasePower { location }));
            queries.push((
                Field::Garrison(location),
                ReadQuery::GarrisonUnits {
                    garrison: self.bindings.garrison,
                    location,
                    token: self.bindings.unit_token,
                },
            ));
        }

        if let Some(player) = self.player {
            queries.push((Field::PlayerLocation, ReadQuery::PlayerLocation { player }));
            queries.push((
                Field::WalletGold,
                ReadQuery::TokenBalance {
                    token: self.gold,
                    owner: player,
                },
            ));
            queries.push((
                Field::EscrowGold,
                ReadQuery::EscrowBalance {
                    owner: player,
                    token: self.gold,
                },
            ));
            queries.push((
                Field::EscrowUnits,
                ReadQuery::EscrowBalance {
                    owner: player,
                    token: self.bindings.unit_token,
                },
            ));
            queries.push((
                Field::Allowance,
                ReadQuery::Allowance {
                    token: self.gold,
                    owner: player,
                    spender: self.game_master,
                },
            ));
        }
        queries
    }
}

/// Result of one [`SnapshotCache::refresh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Published as `version`; `stale_fields` reads failed
    Applied { version: u64, stale_fields: usize },
    /// A refresh that started later was applied first; results dropped
    Superseded,
}

struct Inner {
    reader: Arc<dyn LedgerReader>,
    plan: QueryPlan,
    timeout: Duration,
    tx: watch::Sender<Arc<Snapshot>>,
    next_ticket: AtomicU64,
    applied_ticket: Mutex<u64>,
}

/// Process-wide read-through cache of ledger state
///
/// Cloning is cheap; all clones share the same published snapshot.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<Inner>,
}

impl SnapshotCache {
    pub fn new(reader: Arc<dyn LedgerReader>, plan: QueryPlan, timeout: Duration) -> Self {
        let (tx, _) = watch::channel(Arc::new(Snapshot::empty(plan.player, plan.unit_level)));
        Self {
            inner: Arc::new(Inner {
                reader,
                plan,
                timeout,
                tx,
                next_ticket: AtomicU64::new(0),
                applied_ticket: Mutex::new(0),
            }),
        }
    }

    /// Latest published snapshot
    pub fn current(&self) -> Arc<Snapshot> {
        self.inner.tx.borrow().clone()
    }

    /// Receiver notified on every applied refresh
    pub fn watch(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.tx.subscribe()
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.inner.plan
    }

    /// Issue one batched read and publish the result.
    ///
    /// Never fails: transport errors are classified into
    /// [`Snapshot::last_error`] and the affected fields marked stale.
    pub async fn refresh(&self) -> RefreshOutcome {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let plan = self.inner.plan.queries();
        let queries: Vec<ReadQuery> = plan.iter().map(|(_, q)| *q).collect();

        let batch = match tokio::time::timeout(self.inner.timeout, self.inner.reader.read_batch(&queries)).await
        {
            Ok(result) => result,
            Err(elapsed) => Err(ClientError::from(elapsed)),
        };

        let mut applied = self
            .inner
            .applied_ticket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if ticket < *applied {
            tracing::debug!(ticket, applied = *applied, "Dropping superseded refresh");
            return RefreshOutcome::Superseded;
        }
        *applied = ticket;

        let mut next = Snapshot::clone(&self.current());
        let now = Utc::now();
        let stale_fields = match batch {
            Ok(results) if results.len() == plan.len() => apply_results(&mut next, &plan, results, now),
            Ok(results) => {
                let error = ClientError::invalid_response(format!(
                    "batch returned {} results for {} queries",
                    results.len(),
                    plan.len()
                ));
                fail_all(&mut next, &error, plan.len())
            }
            Err(error) => fail_all(&mut next, &error, plan.len()),
        };

        next.version += 1;
        next.refreshed_at = Some(now);
        let version = next.version;
        self.inner.tx.send_replace(Arc::new(next));
        drop(applied);

        if stale_fields > 0 {
            tracing::debug!(version, stale = stale_fields, "Snapshot refreshed with stale fields");
        } else {
            tracing::trace!(version, "Snapshot refreshed");
        }
        RefreshOutcome::Applied { version, stale_fields }
    }

    /// Out-of-cycle refresh, after a write settled
    pub async fn invalidate_now(&self) -> RefreshOutcome {
        tracing::debug!("Snapshot invalidated");
        self.refresh().await
    }

    /// Refresh now and then every `interval` (at least [`MIN_INTERVAL`])
    /// until the handle is stopped
    pub fn subscribe(&self, interval: Duration) -> PollingHandle {
        let interval = interval.max(MIN_INTERVAL);
        let token = CancellationToken::new();
        let cache = self.clone();
        let cancel = token.clone();

        let poll = async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = cache.refresh() => {}
                        }
                    }
                }
            }
        };

        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(poll).catch_unwind().await {
                Ok(()) => tracing::info!(task = "snapshot_poller", "Polling stopped"),
                Err(panic_info) => {
                    let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = panic_info.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    tracing::error!(task = "snapshot_poller", panic = %panic_msg, "Polling task panicked");
                }
            }
        });
        tracing::info!(task = "snapshot_poller", interval_ms = interval.as_millis() as u64, "Polling started");

        PollingHandle {
            token,
            handle: Some(handle),
        }
    }
}

/// Running polling loop; cancelled when stopped or dropped
pub struct PollingHandle {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollingHandle {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait for it to exit
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Write per-field results, returns how many failed
fn apply_results(
    snapshot: &mut Snapshot,
    plan: &[(Field, ReadQuery)],
    results: Vec<ClientResult<ReadValue>>,
    at: DateTime<Utc>,
) -> usize {
    let mut first_error = None;
    let mut failed = 0;

    for ((field, _), result) in plan.iter().zip(results) {
        let outcome = result.and_then(|value| store(snapshot, *field, value, at));
        if let Err(error) = outcome {
            mark_stale(snapshot, *field);
            failed += 1;
            first_error.get_or_insert(error);
        }
    }

    // unowned locations hold no garrison, whatever the garrison contract says
    for view in snapshot.locations.values_mut() {
        if view.owner.get() == Some(None) && !view.owner.is_stale() {
            view.garrison.update(0, at);
        }
    }

    snapshot.last_error = first_error.map(|error| {
        let classified = classifier::classify(&error);
        tracing::warn!(failed, error = %error, kind = classified.kind.name(), "Partial refresh failure");
        classified
    });
    failed
}

fn fail_all(snapshot: &mut Snapshot, error: &ClientError, fields: usize) -> usize {
    let classified = classifier::classify(error);
    tracing::warn!(error = %error, kind = classified.kind.name(), "Refresh failed");
    snapshot.mark_all_stale();
    snapshot.last_error = Some(classified);
    fields
}

fn store(snapshot: &mut Snapshot, field: Field, value: ReadValue, at: DateTime<Utc>) -> ClientResult<()> {
    let uint = |value: ReadValue| {
        value
            .as_amount()
            .ok_or_else(|| ClientError::invalid_response("expected uint, got address"))
    };

    match field {
        Field::Owner(id) => {
            let owner = value
                .as_address()
                .ok_or_else(|| ClientError::invalid_response("expected address, got uint"))?;
            view_mut(snapshot, id)?.owner.update(owner.non_zero(), at);
        }
        Field::BasePower(id) => {
            let power = uint(value)?.whole_units();
            view_mut(snapshot, id)?.base_power.update(power, at);
        }
        Field::Garrison(id) => {
            let units = uint(value)?.whole_units();
            view_mut(snapshot, id)?.garrison.update(units, at);
        }
        Field::PlayerLocation => {
            let raw = uint(value)?.wei();
            let location = match raw {
                0 => None,
                id => Some(LocationId::new(u32::try_from(id).map_err(|_| {
                    ClientError::invalid_response(format!("location id {} out of range", id))
                })?)),
            };
            snapshot.player_location.update(location, at);
        }
        Field::WalletGold => snapshot.wallet_gold.update(uint(value)?, at),
        Field::EscrowGold => snapshot.escrow_gold.update(uint(value)?, at),
        Field::EscrowUnits => snapshot.escrow_units.update(uint(value)?.whole_units(), at),
        Field::Allowance => snapshot.allowance.update(uint(value)?, at),
    }
    Ok(())
}

fn view_mut(snapshot: &mut Snapshot, id: LocationId) -> ClientResult<&mut super::LocationView> {
    snapshot
        .locations
        .get_mut(&id)
        .ok_or_else(|| ClientError::invalid_response(format!("untracked location {}", id)))
}

fn mark_stale(snapshot: &mut Snapshot, field: Field) {
    match field {
        Field::Owner(id) => {
            if let Some(view) = snapshot.locations.get_mut(&id) {
                view.owner.mark_stale();
            }
        }
        Field::BasePower(id) => {
            if let Some(view) = snapshot.locations.get_mut(&id) {
                view.base_power.mark_stale();
            }
        }
        Field::Garrison(id) => {
            if let Some(view) = snapshot.locations.get_mut(&id) {
                view.garrison.mark_stale();
            }
        }
        Field::PlayerLocation => snapshot.player_location.mark_stale(),
        Field::WalletGold => snapshot.wallet_gold.mark_stale(),
        Field::EscrowGold => snapshot.escrow_gold.mark_stale(),
        Field::EscrowUnits => snapshot.escrow_units.mark_stale(),
        Field::Allowance => snapshot.allowance.mark_stale(),
    }
}
