//! Trait (synergy) definitions.

use serde::{Deserialize, Serialize};

use crate::passives::UnitPassives;
use crate::simulation::TeamModifiers;
use crate::stats::StatGrant;

/// One breakpoint of a trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitTier {
    /// Distinct templates needed.
    pub count: u32,

    /// Stat grants for affected units.
    #[serde(default)]
    pub grants: Vec<StatGrant>,

    /// Passives for affected units.
    #[serde(default)]
    pub passives: UnitPassives,

    /// Team-wide modifiers.
    #[serde(default)]
    pub modifiers: TeamModifiers,
}

/// A trait with ascending tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitData {
    /// Unique trait id, matching unit trait tags.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Bonuses reach every unit on the board, not only members.
    #[serde(default)]
    pub team_wide: bool,

    /// Tiers in ascending `count` order.
    pub tiers: Vec<TraitTier>,
}

impl TraitData {
    /// Highest tier reached with `count` members.
    #[must_use]
    pub fn active_tier(&self, count: u32) -> Option<(usize, &TraitTier)> {
        self.tiers
            .iter()
            .enumerate()
            .filter(|(_, tier)| count >= tier.count)
            .last()
    }
}
