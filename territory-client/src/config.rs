//! Client configuration
//!
//! Everything here is public deployment data (endpoints, contract addresses,
//! fees). Private keys never go through this config: signing belongs to the
//! wallet provider behind `rpc_url`.

use crate::{ClientError, ClientResult};
use shared::models::{Address, Amount, UnitLevel};
use std::str::FromStr;
use std::time::Duration;

/// opBNB testnet JSON-RPC endpoint
pub const DEFAULT_RPC_URL: &str = "https://opbnb-testnet-rpc.bnbchain.org";
/// opBNB testnet chain id
pub const DEFAULT_CHAIN_ID: u64 = 5611;
/// Shortest accepted polling period
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Contract addresses of the game deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub map: Address,
    pub game_master: Address,
    pub gold: Address,
    pub combat: Address,
    pub spawn: Address,
    pub unit_factory: Address,
    /// Resolved through `combat.garrison()` when not set
    pub garrison: Option<Address>,
}

impl ContractAddresses {
    /// opBNB testnet deployment
    pub fn testnet() -> Self {
        Self {
            map: TESTNET_MAP,
            game_master: TESTNET_GAME_MASTER,
            gold: TESTNET_GOLD,
            combat: TESTNET_COMBAT,
            spawn: TESTNET_SPAWN,
            unit_factory: TESTNET_UNIT_FACTORY,
            garrison: None,
        }
    }
}

impl Default for ContractAddresses {
    fn default() -> Self {
        Self::testnet()
    }
}

// opBNB testnet deployment
const TESTNET_MAP: Address = Address::from_bytes([
    0x18, 0x8f, 0x94, 0xed, 0xc3, 0xce, 0x64, 0xfc, 0x5c, 0xa5,
    0x65, 0x97, 0x92, 0x58, 0x8b, 0x66, 0x2f, 0x0e, 0x9e, 0xe4,
]);
const TESTNET_GAME_MASTER: Address = Address::from_bytes([
    0xcd, 0x3b, 0xd5, 0x20, 0x86, 0x8d, 0xd1, 0x6f, 0x02, 0x3a,
    0x11, 0xae, 0xe0, 0xff, 0x96, 0x73, 0x53, 0xc4, 0x58, 0x58,
]);
const TESTNET_GOLD: Address = Address::from_bytes([
    0x96, 0xb7, 0x8a, 0x85, 0xd6, 0xf4, 0x99, 0x65, 0x96, 0xac,
    0xd9, 0xf9, 0x61, 0x9a, 0x11, 0xca, 0xcf, 0x75, 0x1e, 0x8d,
]);
const TESTNET_COMBAT: Address = Address::from_bytes([
    0x8f, 0x04, 0x52, 0xe4, 0x45, 0x6b, 0x5e, 0x87, 0x10, 0x22,
    0x51, 0xb8, 0xb3, 0x61, 0x94, 0xab, 0x50, 0x04, 0xf3, 0xcb,
]);
const TESTNET_SPAWN: Address = Address::from_bytes([
    0xa9, 0x85, 0xae, 0xd3, 0x41, 0x8a, 0x28, 0xcf, 0xa5, 0x79,
    0xc3, 0x9b, 0x4e, 0x5f, 0xff, 0xdf, 0xb5, 0x98, 0x3a, 0xbd,
]);
const TESTNET_UNIT_FACTORY: Address = Address::from_bytes([
    0xc5, 0xc9, 0x81, 0x35, 0x3a, 0x21, 0xda, 0x2a, 0xe0, 0x83,
    0x00, 0x24, 0xee, 0xf6, 0x78, 0x8e, 0x20, 0x5c, 0xc6, 0x1c,
]);

/// Per-action network fees, sent as transaction value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fees {
    pub move_fee: Amount,
    pub spawn_fee: Amount,
    pub attack_fee: Amount,
}

impl Default for Fees {
    fn default() -> Self {
        Self {
            move_fee: Amount::from_wei(10_000_000_000_000_000),
            spawn_fee: Amount::from_wei(10_000_000_000_000_000),
            attack_fee: Amount::from_wei(50_000_000_000_000_000),
        }
    }
}

/// Client configuration for connecting to the game ledger
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// JSON-RPC endpoint (node or wallet provider)
    pub rpc_url: String,

    /// Expected chain; anything else is a wrong network
    pub chain_id: u64,

    /// Connected wallet account
    pub player: Option<Address>,

    pub contracts: ContractAddresses,

    pub fees: Fees,

    /// Unit level used for spawn, fortify and attack
    pub unit_level: UnitLevel,

    /// Power per unit, for previews
    pub unit_power: u64,

    /// Escrowed Gold one unit costs to spawn (whole Gold)
    pub unit_gold_cost: u64,

    /// Snapshot polling interval
    pub poll_interval: Duration,

    /// Transport timeout per request
    pub request_timeout: Duration,

    /// Receipt polling interval while waiting for finality
    pub confirmation_poll: Duration,

    /// Give up waiting for finality after this long (`None` waits forever)
    pub confirmation_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Create a configuration for the testnet deployment
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id: DEFAULT_CHAIN_ID,
            player: None,
            contracts: ContractAddresses::testnet(),
            fees: Fees::default(),
            unit_level: 1,
            unit_power: 1,
            unit_gold_cost: 1,
            poll_interval: Duration::from_millis(3500),
            request_timeout: Duration::from_millis(10_000),
            confirmation_poll: Duration::from_millis(1000),
            confirmation_timeout: Some(Duration::from_millis(120_000)),
        }
    }

    /// Load `.env` (if present) and then read the environment
    pub fn from_dotenv() -> ClientResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Read configuration from environment variables
    ///
    /// Unset variables fall back to the testnet defaults; set but malformed
    /// values are an error.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::new(get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()));
        let contracts = defaults.contracts;

        let contracts = ContractAddresses {
            map: parse_or(&get, "MAP_ADDRESS", contracts.map)?,
            game_master: parse_or(&get, "GAME_MASTER_ADDRESS", contracts.game_master)?,
            gold: parse_or(&get, "GOLD_ADDRESS", contracts.gold)?,
            combat: parse_or(&get, "COMBAT_ADDRESS", contracts.combat)?,
            spawn: parse_or(&get, "SPAWN_ADDRESS", contracts.spawn)?,
            unit_factory: parse_or(&get, "UNIT_FACTORY_ADDRESS", contracts.unit_factory)?,
            garrison: parse_opt(&get, "GARRISON_ADDRESS")?,
        };

        let fees = Fees {
            move_fee: Amount::from_wei(parse_or(&get, "MOVE_FEE_WEI", defaults.fees.move_fee.wei())?),
            spawn_fee: Amount::from_wei(parse_or(&get, "SPAWN_FEE_WEI", defaults.fees.spawn_fee.wei())?),
            attack_fee: Amount::from_wei(parse_or(&get, "ATTACK_FEE_WEI", defaults.fees.attack_fee.wei())?),
        };

        let confirmation_timeout_ms: u64 = parse_or(&get, "CONFIRMATION_TIMEOUT_MS", 120_000)?;

        Ok(Self {
            chain_id: parse_or(&get, "CHAIN_ID", defaults.chain_id)?,
            player: parse_opt(&get, "PLAYER_ADDRESS")?,
            contracts,
            fees,
            unit_level: parse_or(&get, "UNIT_LEVEL", defaults.unit_level)?,
            unit_power: parse_or(&get, "UNIT_POWER", defaults.unit_power)?,
            unit_gold_cost: parse_or(&get, "UNIT_GOLD_COST", defaults.unit_gold_cost)?,
            poll_interval: parse_interval(&get, "POLL_INTERVAL_MS", 3500)?,
            request_timeout: Duration::from_millis(parse_or(&get, "REQUEST_TIMEOUT_MS", 10_000)?),
            confirmation_poll: parse_interval(&get, "CONFIRMATION_POLL_MS", 1000)?,
            confirmation_timeout: (confirmation_timeout_ms > 0)
                .then(|| Duration::from_millis(confirmation_timeout_ms)),
            ..defaults
        })
    }

    /// Set the connected player
    pub fn with_player(mut self, player: Address) -> Self {
        self.player = Some(player);
        self
    }

    /// Set the expected chain id
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Set the contract addresses
    pub fn with_contracts(mut self, contracts: ContractAddresses) -> Self {
        self.contracts = contracts;
        self
    }

    /// Set the per-action fees
    pub fn with_fees(mut self, fees: Fees) -> Self {
        self.fees = fees;
        self
    }

    /// Set the unit level and its power per unit
    pub fn with_unit(mut self, level: UnitLevel, power: u64) -> Self {
        self.unit_level = level;
        self.unit_power = power;
        self
    }

    /// Set the polling interval, at least [`MIN_INTERVAL`]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set how finality is awaited; the receipt poll is at least [`MIN_INTERVAL`]
    pub fn with_confirmation(mut self, poll: Duration, timeout: Option<Duration>) -> Self {
        self.confirmation_poll = poll.max(MIN_INTERVAL);
        self.confirmation_timeout = timeout;
        self
    }

    /// The connected player, or a configuration error
    pub fn require_player(&self) -> ClientResult<Address> {
        self.player
            .ok_or_else(|| ClientError::config("PLAYER_ADDRESS must be set to connect"))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_RPC_URL)
    }
}

fn parse_opt<T, G>(get: &G, name: &str) -> ClientResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| ClientError::config(format!("{}: {}", name, e)))
        })
        .transpose()
}

fn parse_or<T, G>(get: &G, name: &str, default: T) -> ClientResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    Ok(parse_opt(get, name)?.unwrap_or(default))
}

/// Millisecond period that must be non-zero
fn parse_interval<G>(get: &G, name: &str, default_ms: u64) -> ClientResult<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, name, default_ms)? {
        0 => Err(ClientError::config(format!("{}: must be greater than zero", name))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_testnet_addresses() {
        let c = ContractAddresses::testnet();
        assert_eq!(c.map.to_string(), "0x188f94edc3ce64fc5ca5659792588b662f0e9ee4");
        assert_eq!(c.game_master.to_string(), "0xcd3bd520868dd16f023a11aee0ff967353c45858");
        assert_eq!(c.gold.to_string(), "0x96b78a85d6f4996596acd9f9619a11cacf751e8d");
        assert_eq!(c.combat.to_string(), "0x8f0452e4456b5e87102251b8b36194ab5004f3cb");
        assert_eq!(c.spawn.to_string(), "0xa985aed3418a28cfa579c39b4e5fffdfb5983abd");
        assert_eq!(c.unit_factory.to_string(), "0xc5c981353a21da2ae0830024eef6788e205cc61c");
    }

    #[test]
    fn test_defaults_from_empty_env() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.chain_id, 5611);
        assert_eq!(config.player, None);
        assert_eq!(config.fees.move_fee, Amount::from_wei(10_000_000_000_000_000));
        assert_eq!(config.fees.attack_fee, Amount::from_wei(50_000_000_000_000_000));
        assert_eq!(config.poll_interval, Duration::from_millis(3500));
        assert_eq!(config.confirmation_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.contracts.garrison, None);
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("RPC_URL", "http://localhost:8545"),
            ("CHAIN_ID", "31337"),
            ("PLAYER_ADDRESS", "0x1111111111111111111111111111111111111111"),
            ("GARRISON_ADDRESS", "0x2222222222222222222222222222222222222222"),
            ("ATTACK_FEE_WEI", "7"),
            ("CONFIRMATION_TIMEOUT_MS", "0"),
            ("POLL_INTERVAL_MS", "3000"),
        ]))
        .unwrap();
        assert_eq!(config.rpc_url, "http://localhost:8545");
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.player, Some(Address::from_bytes([0x11; 20])));
        assert_eq!(config.contracts.garrison, Some(Address::from_bytes([0x22; 20])));
        assert_eq!(config.fees.attack_fee, Amount::from_wei(7));
        assert_eq!(config.confirmation_timeout, None);
        assert_eq!(config.poll_interval, Duration::from_millis(3000));
    }

    #[test]
    fn test_malformed_values_are_errors() {
        let err = ClientConfig::from_lookup(lookup(&[("CHAIN_ID", "opbnb")])).unwrap_err();
        assert!(matches!(err, ClientError::Config(ref m) if m.starts_with("CHAIN_ID")));

        let err = ClientConfig::from_lookup(lookup(&[("GOLD_ADDRESS", "0x1234")])).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_zero_intervals_are_errors() {
        let err = ClientConfig::from_lookup(lookup(&[("POLL_INTERVAL_MS", "0")])).unwrap_err();
        assert!(matches!(err, ClientError::Config(ref m) if m.starts_with("POLL_INTERVAL_MS")));

        let err = ClientConfig::from_lookup(lookup(&[("CONFIRMATION_POLL_MS", "0")])).unwrap_err();
        assert!(matches!(err, ClientError::Config(ref m) if m.starts_with("CONFIRMATION_POLL_MS")));
    }

    #[test]
    fn test_builders_clamp_zero_intervals() {
        let config = ClientConfig::default()
            .with_poll_interval(Duration::ZERO)
            .with_confirmation(Duration::ZERO, None);
        assert_eq!(config.poll_interval, MIN_INTERVAL);
        assert_eq!(config.confirmation_poll, MIN_INTERVAL);
    }

    #[test]
    fn test_require_player() {
        let config = ClientConfig::default();
        assert!(config.require_player().is_err());
        let player = Address::from_bytes([1; 20]);
        assert_eq!(config.with_player(player).require_player().unwrap(), player);
    }
}
