//! Unit template definitions.

use serde::{Deserialize, Serialize};

use crate::ability::Ability;
use crate::passives::UnitPassives;
use crate::stats::UnitStats;

/// Data-driven unit template.
///
/// # Example RON
///
/// ```ron
/// UnitData(
///     id: "knight",
///     name: "Knight",
///     cost: 1,
///     traits: ["guardian"],
///     stats: (max_health: 650, attack: 55, armor: 35),
///     ability: Some((
///         name: "Shield Bash",
///         effect: Damage(damage: (base: 150, attack_ratio: 0, damage_type: Physical, targets: CurrentTarget)),
///     )),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    /// Unique template id.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Shop cost tier, starting at 1.
    pub cost: u32,

    /// Trait tags.
    #[serde(default)]
    pub traits: Vec<String>,

    /// One-star stats. Omitted fields take the default stat block.
    pub stats: UnitStats,

    /// Ability cast at full mana.
    #[serde(default)]
    pub ability: Option<Ability>,

    /// Innate passives.
    #[serde(default)]
    pub passives: UnitPassives,
}
