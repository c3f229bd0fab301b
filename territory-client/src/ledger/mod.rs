//! Ledger transport
//!
//! The ledger is reached through two traits:
//! - [`LedgerReader`]: side-effect-free queries, issued as one batch per refresh
//! - [`LedgerWriter`]: wallet-signed writes and their receipts
//!
//! [`RpcLedger`] talks JSON-RPC to a node / wallet provider,
//! [`InMemoryLedger`] simulates the game contracts in process.

pub mod abi;
mod memory;
mod rpc;

pub use memory::{Finality, InMemoryLedger, unit_token_address};
pub use rpc::RpcLedger;

use crate::ClientResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{Address, Amount, LocationId, UnitLevel};
use std::fmt;

/// A single read against the game contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadQuery {
    /// `map.getPlayerLocation(player)`, 0 when unset
    PlayerLocation { player: Address },
    /// `map.getLocationOwner(location)`, zero address when unowned
    LocationOwner { location: LocationId },
    /// `map.getLocationBasePower(location)`
    LocationBasePower { location: LocationId },
    /// `garrison.getUnits(location, token)`
    GarrisonUnits {
        garrison: Address,
        location: LocationId,
        token: Address,
    },
    /// `token.balanceOf(owner)`
    TokenBalance { token: Address, owner: Address },
    /// `gameMaster.getBalance(owner, token)`
    EscrowBalance { owner: Address, token: Address },
    /// `token.allowance(owner, spender)`
    Allowance {
        token: Address,
        owner: Address,
        spender: Address,
    },
    /// `combat.garrison()`
    GarrisonContract,
    /// `unitFactory.getToken(level)`
    UnitToken { level: UnitLevel },
}

/// Decoded value of a [`ReadQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadValue {
    Uint(Amount),
    Address(Address),
}

impl ReadValue {
    pub fn as_amount(&self) -> Option<Amount> {
        match self {
            Self::Uint(v) => Some(*v),
            Self::Address(_) => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            Self::Uint(_) => None,
        }
    }
}

/// A state-changing game call, before signing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameCall {
    /// `token.approve(spender, amount)`
    Approve {
        token: Address,
        spender: Address,
        amount: Amount,
    },
    /// `gameMaster.deposit(token, amount)`
    Deposit { token: Address, amount: Amount },
    /// `spawn.spawn(location, level, units)`
    Spawn {
        location: LocationId,
        level: UnitLevel,
        units: u64,
    },
    /// `map.move(from, to)`
    Move { from: LocationId, to: LocationId },
    /// `garrison.fortify(location, token, units)`
    Fortify {
        garrison: Address,
        location: LocationId,
        token: Address,
        units: u64,
    },
    /// `combat.attack(location, token, units)`
    Attack {
        location: LocationId,
        token: Address,
        units: u64,
    },
}

impl GameCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Deposit { .. } => "deposit",
            Self::Spawn { .. } => "spawn",
            Self::Move { .. } => "move",
            Self::Fortify { .. } => "fortify",
            Self::Attack { .. } => "attack",
        }
    }
}

/// Ledger-assigned submission handle (transaction hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(String);

impl TxHandle {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Finality record of a submitted write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub handle: TxHandle,
    /// false when the write reverted
    pub success: bool,
    pub block: u64,
    /// Revert reason, when the ledger reports one
    pub revert_reason: Option<String>,
}

/// Side-effect-free ledger queries
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Chain the transport is connected to
    async fn chain_id(&self) -> ClientResult<u64>;

    /// Issue all queries as one batch.
    ///
    /// The outer error means the whole batch failed (transport down);
    /// inner errors are per-query failures, in query order.
    async fn read_batch(&self, queries: &[ReadQuery]) -> ClientResult<Vec<ClientResult<ReadValue>>>;
}

/// Wallet-signed writes
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Hand the call to the wallet; returns once the write was broadcast
    async fn submit(&self, call: &GameCall, value: Amount) -> ClientResult<TxHandle>;

    /// Receipt of a submitted write, `None` while not final
    async fn receipt(&self, handle: &TxHandle) -> ClientResult<Option<Receipt>>;
}

/// Full ledger surface
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> Ledger for T {}
