//! Combat resolution model
//!
//! Local copy of the ledger's combat arithmetic, used to preview an attack
//! before paying the fee to submit it. The ledger result is authoritative;
//! this only has to agree with it.
//!
//! Rounding follows the ledger exactly:
//! - attacker losses on a win round up (ceiling)
//! - defender losses on a lost attack round down (truncation)
//!
//! All intermediate products are done in `u128`, so no combination of `u64`
//! inputs can overflow.

use crate::models::{Location, LocationStatus};
use serde::{Deserialize, Serialize};

/// Smallest attack the ledger accepts
pub const MIN_ATTACK_UNITS: u64 = 25;

/// Predicted battle outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleOutcome {
    Win,
    Lose,
    /// Rejected before combat (too few units)
    Invalid,
}

/// Result of [`predict`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatPrediction {
    pub outcome: BattleOutcome,
    pub attacker_power: u128,
    pub defender_power: u64,
    pub attacker_losses: u64,
    pub attacker_remaining: u64,
    pub defender_losses: u64,
}

impl CombatPrediction {
    /// Why the attack is invalid, if it is
    pub fn invalid_reason(&self) -> Option<&'static str> {
        match self.outcome {
            BattleOutcome::Invalid => Some("minimum attack size not met"),
            _ => None,
        }
    }

    /// Player-facing summary line
    pub fn message(&self) -> String {
        match self.outcome {
            BattleOutcome::Invalid => {
                format!("Need at least {} units to attack", MIN_ATTACK_UNITS)
            }
            BattleOutcome::Win if self.defender_power == 0 => {
                "Empty location - guaranteed win!".to_string()
            }
            BattleOutcome::Win => "Victory! You capture the location.".to_string(),
            BattleOutcome::Lose => format!(
                "You lose! Need more than {} power (currently {})",
                self.defender_power, self.attacker_power
            ),
        }
    }
}

/// Predict the ledger's combat outcome.
///
/// `garrison_defended` is true for PVP targets; PVE base power has no
/// garrison to deplete, so a lost PVE attack costs the defender nothing.
pub fn predict(
    attacker_units: u64,
    power_per_unit: u64,
    defender_power: u64,
    garrison_defended: bool,
) -> CombatPrediction {
    let attacker_power = power_per_unit as u128 * attacker_units as u128;
    let base = CombatPrediction {
        outcome: BattleOutcome::Invalid,
        attacker_power,
        defender_power,
        attacker_losses: 0,
        attacker_remaining: attacker_units,
        defender_losses: 0,
    };

    if attacker_units < MIN_ATTACK_UNITS {
        return base;
    }

    if defender_power == 0 {
        return CombatPrediction {
            outcome: BattleOutcome::Win,
            ..base
        };
    }

    let defender = defender_power as u128;

    // ties go to the defender
    if attacker_power <= defender {
        let defender_losses = if garrison_defended {
            // attacker_power <= defender_power, so the product fits
            (attacker_power * defender / defender) as u64
        } else {
            0
        };
        return CombatPrediction {
            outcome: BattleOutcome::Lose,
            attacker_losses: attacker_units,
            attacker_remaining: 0,
            defender_losses,
            ..base
        };
    }

    let attacker_losses = div_ceil(defender * attacker_units as u128, attacker_power);
    // attacker_power > defender_power bounds the ratio below attacker_units
    let attacker_losses = attacker_losses as u64;

    CombatPrediction {
        outcome: BattleOutcome::Win,
        attacker_losses,
        attacker_remaining: attacker_units - attacker_losses,
        defender_losses: defender_power,
        ..base
    }
}

fn div_ceil(numerator: u128, denominator: u128) -> u128 {
    let q = numerator / denominator;
    if numerator % denominator == 0 { q } else { q + 1 }
}

/// Attack preview for a concrete location, built from snapshot values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattlePreview {
    pub target: Location,
    pub status: LocationStatus,
    pub attacker_units: u64,
    pub prediction: CombatPrediction,
    /// Minimum power that captures the target
    pub power_to_capture: u64,
    /// Some input came from a stale snapshot field
    pub stale: bool,
}

impl BattlePreview {
    pub fn new(
        target: &Location,
        status: LocationStatus,
        attacker_units: u64,
        power_per_unit: u64,
        stale: bool,
    ) -> Self {
        let defender_power = target.defender_power();
        let prediction = predict(
            attacker_units,
            power_per_unit,
            defender_power,
            target.is_owned(),
        );
        Self {
            target: target.clone(),
            status,
            attacker_units,
            prediction,
            power_to_capture: defender_power.saturating_add(1),
            stale,
        }
    }

    pub fn outcome(&self) -> BattleOutcome {
        self.prediction.outcome
    }

    pub fn message(&self) -> String {
        self.prediction.message()
    }
}
