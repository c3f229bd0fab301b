//! Player Model

use super::{Address, Amount, LocationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unit level as understood by the unit factory
pub type UnitLevel = u32;

/// Player read model (last known ledger values)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub address: Address,
    /// Unset until the first spawn or move
    pub location: Option<LocationId>,
    /// Gold held in the wallet
    pub wallet_gold: Amount,
    /// Gold held in game escrow, spent by spawning
    pub escrow_gold: Amount,
    /// Escrowed whole units per level
    pub escrow_units: BTreeMap<UnitLevel, u64>,
    /// Gold the game contract may pull from the wallet
    pub allowance: Amount,
}

impl Player {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            location: None,
            wallet_gold: Amount::ZERO,
            escrow_gold: Amount::ZERO,
            escrow_units: BTreeMap::new(),
            allowance: Amount::ZERO,
        }
    }

    pub fn units_at_level(&self, level: UnitLevel) -> u64 {
        self.escrow_units.get(&level).copied().unwrap_or(0)
    }

    /// Whether a deposit of `amount` is covered by the current allowance
    pub fn can_deposit(&self, amount: Amount) -> bool {
        self.allowance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_is_empty() {
        let p = Player::new(Address::from_bytes([3; 20]));
        assert_eq!(p.location, None);
        assert_eq!(p.units_at_level(1), 0);
        assert!(p.can_deposit(Amount::ZERO));
        assert!(!p.can_deposit(Amount::from_units(1)));
    }

    #[test]
    fn test_units_by_level() {
        let mut p = Player::new(Address::from_bytes([3; 20]));
        p.escrow_units.insert(1, 120);
        assert_eq!(p.units_at_level(1), 120);
        assert_eq!(p.units_at_level(2), 0);
    }
}
