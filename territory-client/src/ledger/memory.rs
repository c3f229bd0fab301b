//! In-process ledger
//!
//! Simulates the game contracts closely enough to drive the client end to
//! end: balances, allowances, escrow, locations and combat. Writes take
//! effect at finality, which is either immediate or released by the caller
//! through [`InMemoryLedger::finalize_all`].

use super::{GameCall, LedgerReader, LedgerWriter, ReadQuery, ReadValue, Receipt, TxHandle};
use crate::config::{ClientConfig, ContractAddresses, Fees};
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use shared::combat::{self, BattleOutcome};
use shared::models::{Address, Amount, Location, LocationId, UnitLevel, ALL_LOCATIONS, is_adjacent};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// When submitted writes become final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Finality {
    /// Final as soon as submitted
    #[default]
    Immediate,
    /// Pending until [`InMemoryLedger::finalize_all`]
    Manual,
}

type ReadFault = Box<dyn Fn(&ReadQuery) -> bool + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct SimLocation {
    base_power: u64,
    owner: Option<Address>,
    garrison: u64,
}

struct PendingTx {
    handle: TxHandle,
    call: GameCall,
    value: Amount,
}

struct State {
    chain_id: u64,
    block: u64,
    next_tx: u64,
    finality: Finality,
    locations: BTreeMap<LocationId, SimLocation>,
    // (token, owner)
    wallet: HashMap<(Address, Address), Amount>,
    // (token, owner, spender)
    allowances: HashMap<(Address, Address, Address), Amount>,
    // (owner, token)
    escrow: HashMap<(Address, Address), Amount>,
    player_location: HashMap<Address, LocationId>,
    pending: Vec<PendingTx>,
    receipts: HashMap<TxHandle, Receipt>,
    submissions: Vec<GameCall>,
    read_fault: Option<ReadFault>,
    offline: bool,
    next_submit_error: Option<ClientError>,
    next_read_delay: Option<Duration>,
    next_submit_delay: Option<Duration>,
}

/// Simulated ledger for tests and demos
pub struct InMemoryLedger {
    sender: Address,
    expected_chain_id: u64,
    contracts: ContractAddresses,
    garrison: Address,
    fees: Fees,
    unit_level: UnitLevel,
    unit_power: u64,
    unit_gold_cost: u64,
    state: Mutex<State>,
}

/// Deterministic token address for a unit level
pub fn unit_token_address(level: UnitLevel) -> Address {
    let mut bytes = [0x75; 20];
    bytes[16..].copy_from_slice(&level.to_be_bytes());
    Address::from_bytes(bytes)
}

const DEFAULT_GARRISON: Address = Address::from_bytes([0x6a; 20]);

impl InMemoryLedger {
    /// Create a ledger matching the client configuration, with the four map
    /// locations unowned at base power 30
    pub fn new(config: &ClientConfig) -> Self {
        let locations = ALL_LOCATIONS
            .iter()
            .map(|id| {
                (
                    *id,
                    SimLocation {
                        base_power: 30,
                        ..Default::default()
                    },
                )
            })
            .collect();

        Self {
            sender: config.player.unwrap_or_default(),
            expected_chain_id: config.chain_id,
            contracts: config.contracts,
            garrison: config.contracts.garrison.unwrap_or(DEFAULT_GARRISON),
            fees: config.fees,
            unit_level: config.unit_level,
            unit_power: config.unit_power,
            unit_gold_cost: config.unit_gold_cost,
            state: Mutex::new(State {
                chain_id: config.chain_id,
                block: 0,
                next_tx: 1,
                finality: Finality::Immediate,
                locations,
                wallet: HashMap::new(),
                allowances: HashMap::new(),
                escrow: HashMap::new(),
                player_location: HashMap::new(),
                pending: Vec::new(),
                receipts: HashMap::new(),
                submissions: Vec::new(),
                read_fault: None,
                offline: false,
                next_submit_error: None,
                next_read_delay: None,
                next_submit_delay: None,
            }),
        }
    }

    pub fn with_finality(self, finality: Finality) -> Self {
        self.lock().finality = finality;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // a panic while holding the lock leaves plain data behind, still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn garrison_contract(&self) -> Address {
        self.garrison
    }

    pub fn unit_token(&self) -> Address {
        unit_token_address(self.unit_level)
    }

    // ========== Seeding ==========

    /// Credit wallet Gold
    pub fn mint_gold(&self, owner: Address, amount: Amount) {
        let gold = self.contracts.gold;
        let mut state = self.lock();
        let balance = state.wallet.entry((gold, owner)).or_default();
        *balance = *balance + amount;
    }

    /// Credit escrowed units of the configured level
    pub fn grant_units(&self, owner: Address, units: u64) {
        let token = self.unit_token();
        let mut state = self.lock();
        let balance = state.escrow.entry((owner, token)).or_default();
        *balance = *balance + Amount::from_units(units);
    }

    pub fn set_location(&self, id: LocationId, base_power: u64, owner: Option<Address>, garrison: u64) {
        let owner = owner.and_then(Address::non_zero);
        self.lock().locations.insert(
            id,
            SimLocation {
                base_power,
                owner,
                garrison: if owner.is_some() { garrison } else { 0 },
            },
        );
    }

    pub fn set_player_location(&self, player: Address, location: LocationId) {
        self.lock().player_location.insert(player, location);
    }

    /// Pretend the wallet switched chains
    pub fn set_chain_id(&self, chain_id: u64) {
        self.lock().chain_id = chain_id;
    }

    // ========== Fault injection ==========

    /// Fail every read matching `predicate` until cleared
    pub fn fail_reads<F>(&self, predicate: F)
    where
        F: Fn(&ReadQuery) -> bool + Send + Sync + 'static,
    {
        self.lock().read_fault = Some(Box::new(predicate));
    }

    pub fn clear_read_faults(&self) {
        self.lock().read_fault = None;
    }

    /// Fail whole batches and submissions as unreachable
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make the next submission fail with `error`, as a wallet would
    pub fn fail_next_submit(&self, error: ClientError) {
        self.lock().next_submit_error = Some(error);
    }

    /// Answer the next batch with the current state, but only after `delay`
    pub fn delay_next_read(&self, delay: Duration) {
        self.lock().next_read_delay = Some(delay);
    }

    /// Hold the next submission for `delay`, like a pending wallet prompt
    pub fn delay_next_submit(&self, delay: Duration) {
        self.lock().next_submit_delay = Some(delay);
    }

    // ========== Finality ==========

    /// Settle every pending write in submission order
    pub fn finalize_all(&self) -> usize {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        let count = pending.len();
        for tx in pending {
            self.settle(&mut state, tx);
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    // ========== Inspection ==========

    /// Every call that reached the wallet, in order
    pub fn submissions(&self) -> Vec<GameCall> {
        self.lock().submissions.clone()
    }

    pub fn wallet_gold(&self, owner: Address) -> Amount {
        let gold = self.contracts.gold;
        self.lock().wallet.get(&(gold, owner)).copied().unwrap_or_default()
    }

    pub fn escrow_gold(&self, owner: Address) -> Amount {
        let gold = self.contracts.gold;
        self.lock().escrow.get(&(owner, gold)).copied().unwrap_or_default()
    }

    pub fn escrow_units(&self, owner: Address) -> u64 {
        let token = self.unit_token();
        self.lock()
            .escrow
            .get(&(owner, token))
            .copied()
            .unwrap_or_default()
            .whole_units()
    }

    pub fn location(&self, id: LocationId) -> Option<Location> {
        self.lock()
            .locations
            .get(&id)
            .map(|l| Location::new(id, l.base_power, l.owner, l.garrison))
    }

    pub fn player_location(&self, player: Address) -> Option<LocationId> {
        self.lock().player_location.get(&player).copied()
    }

    // ========== Simulation ==========

    fn read(&self, state: &State, query: &ReadQuery) -> ClientResult<ReadValue> {
        let location = |id: &LocationId| {
            state.locations.get(id).ok_or_else(|| ClientError::Reverted {
                reason: Some("invalid location".into()),
            })
        };
        let uint = |v: Amount| Ok(ReadValue::Uint(v));

        match query {
            ReadQuery::PlayerLocation { player } => uint(Amount::from_wei(
                state.player_location.get(player).map(|l| l.get()).unwrap_or(0).into(),
            )),
            ReadQuery::LocationOwner { location: id } => Ok(ReadValue::Address(
                location(id)?.owner.unwrap_or(Address::ZERO),
            )),
            ReadQuery::LocationBasePower { location: id } => {
                uint(Amount::from_units(location(id)?.base_power))
            }
            ReadQuery::GarrisonUnits {
                location: id,
                token,
                ..
            } => {
                let loc = location(id)?;
                let units = if *token == self.unit_token() { loc.garrison } else { 0 };
                uint(Amount::from_units(units))
            }
            ReadQuery::TokenBalance { token, owner } => {
                uint(state.wallet.get(&(*token, *owner)).copied().unwrap_or_default())
            }
            ReadQuery::EscrowBalance { owner, token } => {
                uint(state.escrow.get(&(*owner, *token)).copied().unwrap_or_default())
            }
            ReadQuery::Allowance {
                token,
                owner,
                spender,
            } => uint(
                state
                    .allowances
                    .get(&(*token, *owner, *spender))
                    .copied()
                    .unwrap_or_default(),
            ),
            ReadQuery::GarrisonContract => Ok(ReadValue::Address(self.garrison)),
            ReadQuery::UnitToken { level } => Ok(ReadValue::Address(unit_token_address(*level))),
        }
    }

    fn settle(&self, state: &mut State, tx: PendingTx) {
        state.block += 1;
        let result = self.apply(state, &tx.call, tx.value);
        if let Err(reason) = &result {
            tracing::debug!(call = tx.call.name(), handle = %tx.handle, reason = %reason, "simulated revert");
        }
        let receipt = Receipt {
            handle: tx.handle.clone(),
            success: result.is_ok(),
            block: state.block,
            revert_reason: result.err(),
        };
        state.receipts.insert(tx.handle, receipt);
    }

    fn apply(&self, state: &mut State, call: &GameCall, value: Amount) -> Result<(), String> {
        let sender = self.sender;
        let require = |cond: bool, reason: &str| if cond { Ok(()) } else { Err(reason.to_string()) };

        match *call {
            GameCall::Approve {
                token,
                spender,
                amount,
            } => {
                state.allowances.insert((token, sender, spender), amount);
            }
            GameCall::Deposit { token, amount } => {
                require(!amount.is_zero(), "zero amount")?;
                let spender = self.contracts.game_master;
                let allowance = state
                    .allowances
                    .get(&(token, sender, spender))
                    .copied()
                    .unwrap_or_default();
                require(allowance >= amount, "insufficient allowance")?;
                let balance = state.wallet.get(&(token, sender)).copied().unwrap_or_default();
                require(balance >= amount, "transfer amount exceeds balance")?;

                state.wallet.insert((token, sender), balance.saturating_sub(amount));
                if !allowance.is_unlimited() {
                    state
                        .allowances
                        .insert((token, sender, spender), allowance.saturating_sub(amount));
                }
                let escrow = state.escrow.entry((sender, token)).or_default();
                *escrow = *escrow + amount;
            }
            GameCall::Spawn {
                location,
                level,
                units,
            } => {
                require(value >= self.fees.spawn_fee, "insufficient fee")?;
                require(units > 0, "zero amount")?;
                require(state.locations.contains_key(&location), "invalid location")?;
                let cost = Amount::from_units(self.unit_gold_cost)
                    .checked_mul_units(units)
                    .unwrap_or(Amount::MAX);
                let gold = self.contracts.gold;
                let escrow_gold = state.escrow.get(&(sender, gold)).copied().unwrap_or_default();
                require(escrow_gold >= cost, "insufficient gold")?;

                state.escrow.insert((sender, gold), escrow_gold.saturating_sub(cost));
                let minted = state.escrow.entry((sender, unit_token_address(level))).or_default();
                *minted = *minted + Amount::from_units(units);
                state.player_location.entry(sender).or_insert(location);
            }
            GameCall::Move { from, to } => {
                require(value >= self.fees.move_fee, "insufficient fee")?;
                require(
                    state.player_location.get(&sender) == Some(&from),
                    "not at location",
                )?;
                require(is_adjacent(from, to), "not adjacent")?;
                state.player_location.insert(sender, to);
            }
            GameCall::Fortify {
                location,
                token,
                units,
                ..
            } => {
                require(units > 0, "zero amount")?;
                let owner = state.locations.get(&location).and_then(|l| l.owner);
                require(owner == Some(sender), "not owner")?;
                let held = state.escrow.get(&(sender, token)).copied().unwrap_or_default();
                let moved = Amount::from_units(units);
                require(held >= moved, "insufficient units")?;

                state.escrow.insert((sender, token), held.saturating_sub(moved));
                if let Some(loc) = state.locations.get_mut(&location) {
                    loc.garrison = loc.garrison.saturating_add(units);
                }
            }
            GameCall::Attack {
                location,
                token,
                units,
            } => {
                require(value >= self.fees.attack_fee, "insufficient fee")?;
                require(units >= combat::MIN_ATTACK_UNITS, "minimum 25 units required")?;
                let target = state
                    .locations
                    .get(&location)
                    .cloned()
                    .ok_or_else(|| "invalid location".to_string())?;
                require(target.owner != Some(sender), "cannot attack own location")?;
                let held = state.escrow.get(&(sender, token)).copied().unwrap_or_default();
                require(held.whole_units() >= units, "insufficient units")?;

                let owned = target.owner.is_some();
                let defender_power = if owned { target.garrison } else { target.base_power };
                let result = combat::predict(units, self.unit_power, defender_power, owned);

                state
                    .escrow
                    .insert((sender, token), held.saturating_sub(Amount::from_units(units)));
                if let Some(loc) = state.locations.get_mut(&location) {
                    match result.outcome {
                        BattleOutcome::Win => {
                            loc.owner = Some(sender);
                            loc.garrison = result.attacker_remaining;
                        }
                        BattleOutcome::Lose if owned => {
                            loc.garrison = loc.garrison.saturating_sub(result.defender_losses);
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn chain_id(&self) -> ClientResult<u64> {
        let state = self.lock();
        if state.offline {
            return Err(ClientError::Unreachable("connection refused".into()));
        }
        Ok(state.chain_id)
    }

    async fn read_batch(&self, queries: &[ReadQuery]) -> ClientResult<Vec<ClientResult<ReadValue>>> {
        let (results, delay) = {
            let mut state = self.lock();
            if state.offline {
                return Err(ClientError::Unreachable("connection refused".into()));
            }
            let results = queries
                .iter()
                .map(|query| match &state.read_fault {
                    Some(fault) if fault(query) => Err(ClientError::Rpc {
                        code: -32000,
                        message: "header not found".into(),
                        data: None,
                    }),
                    _ => self.read(&state, query),
                })
                .collect();
            (results, state.next_read_delay.take())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(results)
    }
}

#[async_trait]
impl LedgerWriter for InMemoryLedger {
    async fn submit(&self, call: &GameCall, value: Amount) -> ClientResult<TxHandle> {
        let delay = self.lock().next_submit_delay.take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        if state.offline {
            return Err(ClientError::Unreachable("connection refused".into()));
        }
        if let Some(error) = state.next_submit_error.take() {
            return Err(error);
        }
        if state.chain_id != self.expected_chain_id {
            return Err(ClientError::WrongNetwork {
                expected: self.expected_chain_id,
                actual: state.chain_id,
            });
        }

        let handle = TxHandle::new(format!("0x{:064x}", state.next_tx));
        state.next_tx += 1;
        state.submissions.push(*call);

        let tx = PendingTx {
            handle: handle.clone(),
            call: *call,
            value,
        };
        match state.finality {
            Finality::Immediate => self.settle(&mut state, tx),
            Finality::Manual => state.pending.push(tx),
        }
        Ok(handle)
    }

    async fn receipt(&self, handle: &TxHandle) -> ClientResult<Option<Receipt>> {
        let state = self.lock();
        if state.offline {
            return Err(ClientError::Unreachable("connection refused".into()));
        }
        if let Some(receipt) = state.receipts.get(handle) {
            return Ok(Some(receipt.clone()));
        }
        if state.pending.iter().any(|tx| &tx.handle == handle) {
            return Ok(None);
        }
        Err(ClientError::invalid_response(format!("unknown transaction {}", handle)))
    }
}
