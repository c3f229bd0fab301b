//! Location Model
//!
//! The map is a fixed graph of four locations. Adjacency is compiled in and
//! symmetric; ownership, base power and garrison sizes come from the ledger.

use super::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Location identifier (1-based, as on the ledger)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(u32);

impl LocationId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Whether this id is part of the deployed map
    pub fn is_known(&self) -> bool {
        ALL_LOCATIONS.contains(self)
    }

    /// Neighbours of this location, empty for unknown ids
    pub fn neighbours(&self) -> &'static [LocationId] {
        ADJACENCY
            .iter()
            .find(|(id, _)| id == self)
            .map(|(_, adjacent)| *adjacent)
            .unwrap_or(&[])
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

const L1: LocationId = LocationId(1);
const L2: LocationId = LocationId(2);
const L3: LocationId = LocationId(3);
const L4: LocationId = LocationId(4);

/// Every location on the current map
pub const ALL_LOCATIONS: [LocationId; 4] = [L1, L2, L3, L4];

// edges: 1-2, 1-3, 2-3, 2-4, 3-4
const ADJACENCY: [(LocationId, &[LocationId]); 4] = [
    (L1, &[L2, L3]),
    (L2, &[L1, L3, L4]),
    (L3, &[L1, L2, L4]),
    (L4, &[L2, L3]),
];

/// Whether a unit can move directly from `from` to `to`
pub fn is_adjacent(from: LocationId, to: LocationId) -> bool {
    from.neighbours().contains(&to)
}

/// How a location relates to the viewing player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    /// Owned by the viewing player
    Yours,
    /// Owned by another player (PVP)
    Enemy,
    /// Unowned, defended by base power (PVE)
    Unclaimed,
}

/// Location read model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    /// Defence used while unowned
    pub base_power: u64,
    pub owner: Option<Address>,
    /// Deployed units, always 0 while unowned
    pub garrison: u64,
}

impl Location {
    pub fn new(id: LocationId, base_power: u64, owner: Option<Address>, garrison: u64) -> Self {
        let owner = owner.and_then(Address::non_zero);
        let garrison = if owner.is_some() { garrison } else { 0 };
        Self {
            id,
            base_power,
            owner,
            garrison,
        }
    }

    pub fn is_owned(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_owned_by(&self, player: &Address) -> bool {
        self.owner.as_ref() == Some(player)
    }

    /// Power an attacker has to beat: garrison when owned, base power otherwise
    pub fn defender_power(&self) -> u64 {
        if self.is_owned() {
            self.garrison
        } else {
            self.base_power
        }
    }

    pub fn status_for(&self, player: Option<&Address>) -> LocationStatus {
        match (&self.owner, player) {
            (None, _) => LocationStatus::Unclaimed,
            (Some(owner), Some(player)) if owner == player => LocationStatus::Yours,
            (Some(_), _) => LocationStatus::Enemy,
        }
    }

    pub fn neighbours(&self) -> &'static [LocationId] {
        self.id.neighbours()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        for a in ALL_LOCATIONS {
            for b in ALL_LOCATIONS {
                assert_eq!(is_adjacent(a, b), is_adjacent(b, a), "{} <-> {}", a, b);
            }
        }
    }

    #[test]
    fn test_adjacency_edges() {
        let l = LocationId::new;
        assert!(is_adjacent(l(1), l(2)));
        assert!(is_adjacent(l(1), l(3)));
        assert!(is_adjacent(l(2), l(3)));
        assert!(is_adjacent(l(2), l(4)));
        assert!(is_adjacent(l(3), l(4)));
        assert!(!is_adjacent(l(1), l(4)));
        assert!(!is_adjacent(l(1), l(1)));
    }

    #[test]
    fn test_unknown_location() {
        let unknown = LocationId::new(9);
        assert!(!unknown.is_known());
        assert!(unknown.neighbours().is_empty());
        assert!(!is_adjacent(unknown, LocationId::new(1)));
    }

    #[test]
    fn test_unowned_has_no_garrison() {
        let loc = Location::new(LocationId::new(1), 30, None, 12);
        assert_eq!(loc.garrison, 0);
        assert_eq!(loc.defender_power(), 30);

        let zero_owner = Location::new(LocationId::new(1), 30, Some(Address::ZERO), 12);
        assert!(!zero_owner.is_owned());
        assert_eq!(zero_owner.garrison, 0);
    }

    #[test]
    fn test_owned_defender_power_is_garrison() {
        let loc = Location::new(LocationId::new(2), 30, Some(addr(7)), 55);
        assert_eq!(loc.defender_power(), 55);
        assert!(loc.is_owned_by(&addr(7)));
    }

    #[test]
    fn test_status_for() {
        let me = addr(1);
        let other = addr(2);
        let unowned = Location::new(LocationId::new(1), 30, None, 0);
        let mine = Location::new(LocationId::new(2), 30, Some(me), 10);
        let theirs = Location::new(LocationId::new(3), 30, Some(other), 10);

        assert_eq!(unowned.status_for(Some(&me)), LocationStatus::Unclaimed);
        assert_eq!(mine.status_for(Some(&me)), LocationStatus::Yours);
        assert_eq!(theirs.status_for(Some(&me)), LocationStatus::Enemy);
        assert_eq!(mine.status_for(None), LocationStatus::Enemy);
    }
}
