//! Item and crest definitions.

use serde::{Deserialize, Serialize};

use crate::passives::UnitPassives;
use crate::simulation::TeamModifiers;
use crate::stats::StatGrant;

/// Equippable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemData {
    /// Unique item id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Stat grants for the holder.
    #[serde(default)]
    pub grants: Vec<StatGrant>,

    /// Passives for the holder.
    #[serde(default)]
    pub passives: UnitPassives,
}

/// Player-wide crest picked in a crest draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrestData {
    /// Unique crest id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Grants for every unit of the owner.
    #[serde(default)]
    pub grants: Vec<StatGrant>,

    /// Team-wide modifiers.
    #[serde(default)]
    pub modifiers: TeamModifiers,
}
