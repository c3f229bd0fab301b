//! State snapshot
//!
//! A [`Snapshot`] is an immutable, versioned copy of the ledger values the
//! client tracks. [`SnapshotCache`] is the only writer: every applied
//! refresh publishes a new `Arc<Snapshot>` with `version + 1`.
//!
//! Fields are [`Tracked`]: a failed read keeps the last known value and
//! flags it stale instead of clearing it.

mod cache;

pub use cache::{Bindings, PollingHandle, QueryPlan, RefreshOutcome, SnapshotCache};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::error::ClassifiedError;
use shared::models::{ALL_LOCATIONS, Address, Amount, Location, LocationId, Player, UnitLevel};
use std::collections::BTreeMap;

/// Last known value of one ledger field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tracked<T> {
    value: Option<T>,
    stale: bool,
    updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for Tracked<T> {
    fn default() -> Self {
        Self {
            value: None,
            stale: false,
            updated_at: None,
        }
    }
}

impl<T> Tracked<T> {
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_known(&self) -> bool {
        self.value.is_some()
    }

    /// The last read of this field failed
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub(crate) fn update(&mut self, value: T, at: DateTime<Utc>) {
        self.value = Some(value);
        self.stale = false;
        self.updated_at = Some(at);
    }

    pub(crate) fn mark_stale(&mut self) {
        self.stale = true;
    }
}

impl<T: Copy> Tracked<T> {
    pub fn get(&self) -> Option<T> {
        self.value
    }
}

/// Ledger values of one map location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationView {
    pub id: LocationId,
    pub owner: Tracked<Option<Address>>,
    pub base_power: Tracked<u64>,
    /// Units of the tracked level deployed here
    pub garrison: Tracked<u64>,
}

impl LocationView {
    fn new(id: LocationId) -> Self {
        Self {
            id,
            owner: Tracked::default(),
            base_power: Tracked::default(),
            garrison: Tracked::default(),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.owner.is_stale() || self.base_power.is_stale() || self.garrison.is_stale()
    }

    /// Read model, once the values that decide combat are known
    pub fn to_location(&self) -> Option<Location> {
        let owner = self.owner.get()?;
        let base_power = self.base_power.get()?;
        let garrison = match owner {
            Some(_) => self.garrison.get()?,
            None => 0,
        };
        Some(Location::new(self.id, base_power, owner, garrison))
    }
}

/// One published view of ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Incremented by every applied refresh, 0 before the first
    pub version: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub player: Option<Address>,
    pub unit_level: UnitLevel,
    pub locations: BTreeMap<LocationId, LocationView>,
    pub player_location: Tracked<Option<LocationId>>,
    pub wallet_gold: Tracked<Amount>,
    pub escrow_gold: Tracked<Amount>,
    pub escrow_units: Tracked<u64>,
    /// Gold the game master may pull from the player's wallet
    pub allowance: Tracked<Amount>,
    /// Classified failure of the latest refresh, if any
    pub last_error: Option<ClassifiedError>,
}

impl Snapshot {
    /// Nothing loaded yet
    pub fn empty(player: Option<Address>, unit_level: UnitLevel) -> Self {
        Self {
            version: 0,
            refreshed_at: None,
            player,
            unit_level,
            locations: ALL_LOCATIONS
                .iter()
                .map(|id| (*id, LocationView::new(*id)))
                .collect(),
            player_location: Tracked::default(),
            wallet_gold: Tracked::default(),
            escrow_gold: Tracked::default(),
            escrow_units: Tracked::default(),
            allowance: Tracked::default(),
            last_error: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.version > 0
    }

    /// Any field is stale
    pub fn is_stale(&self) -> bool {
        self.locations.values().any(LocationView::is_stale)
            || self.player_location.is_stale()
            || self.wallet_gold.is_stale()
            || self.escrow_gold.is_stale()
            || self.escrow_units.is_stale()
            || self.allowance.is_stale()
    }

    pub fn location_view(&self, id: LocationId) -> Option<&LocationView> {
        self.locations.get(&id)
    }

    pub fn location(&self, id: LocationId) -> Option<Location> {
        self.location_view(id)?.to_location()
    }

    /// Every location whose combat values are known
    pub fn known_locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.locations.values().filter_map(LocationView::to_location)
    }

    /// Owner per the latest read: `None` if never loaded, `Some(None)` if unowned
    pub fn owner_of(&self, id: LocationId) -> Option<Option<Address>> {
        self.location_view(id)?.owner.get()
    }

    /// Player read model with unknown values defaulted
    pub fn player_model(&self) -> Option<Player> {
        let mut player = Player::new(self.player?);
        player.location = self.player_location.get().flatten();
        player.wallet_gold = self.wallet_gold.get().unwrap_or_default();
        player.escrow_gold = self.escrow_gold.get().unwrap_or_default();
        player.allowance = self.allowance.get().unwrap_or_default();
        if let Some(units) = self.escrow_units.get() {
            player.escrow_units.insert(self.unit_level, units);
        }
        Some(player)
    }

    pub(crate) fn mark_all_stale(&mut self) {
        for view in self.locations.values_mut() {
            view.owner.mark_stale();
            view.base_power.mark_stale();
            view.garrison.mark_stale();
        }
        self.player_location.mark_stale();
        self.wallet_gold.mark_stale();
        self.escrow_gold.mark_stale();
        self.escrow_units.mark_stale();
        self.allowance.mark_stale();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_keeps_value_when_stale() {
        let mut t = Tracked::default();
        assert!(!t.is_known());
        t.update(5u64, Utc::now());
        t.mark_stale();
        assert_eq!(t.get(), Some(5));
        assert!(t.is_stale());
        t.update(6, Utc::now());
        assert!(!t.is_stale());
    }

    #[test]
    fn test_empty_snapshot() {
        let s = Snapshot::empty(None, 1);
        assert!(!s.is_loaded());
        assert_eq!(s.locations.len(), 4);
        assert_eq!(s.location(LocationId::new(1)), None);
        assert_eq!(s.owner_of(LocationId::new(1)), None);
        assert!(s.player_model().is_none());
    }

    #[test]
    fn test_location_needs_garrison_only_when_owned() {
        let now = Utc::now();
        let mut view = LocationView::new(LocationId::new(2));
        view.owner.update(None, now);
        view.base_power.update(30, now);
        assert_eq!(view.to_location().unwrap().defender_power(), 30);

        view.owner.update(Some(Address::from_bytes([1; 20])), now);
        assert_eq!(view.to_location(), None);
        view.garrison.update(12, now);
        assert_eq!(view.to_location().unwrap().defender_power(), 12);
    }

    #[test]
    fn test_player_model() {
        let me = Address::from_bytes([3; 20]);
        let mut s = Snapshot::empty(Some(me), 1);
        s.player_location.update(Some(LocationId::new(4)), Utc::now());
        s.escrow_units.update(40, Utc::now());
        let player = s.player_model().unwrap();
        assert_eq!(player.location, Some(LocationId::new(4)));
        assert_eq!(player.units_at_level(1), 40);
        assert_eq!(player.allowance, Amount::ZERO);
    }

    #[test]
    fn test_mark_all_stale() {
        let mut s = Snapshot::empty(None, 1);
        assert!(!s.is_stale());
        s.mark_all_stale();
        assert!(s.is_stale());
    }
}
