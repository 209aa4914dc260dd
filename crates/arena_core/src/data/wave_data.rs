//! PvE wave definitions.

use serde::{Deserialize, Serialize};

use crate::hex::HexCoord;
use crate::room::RoundKind;
use crate::unit::LootTag;

/// One hostile unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveUnit {
    /// Template id.
    pub template: String,

    /// Star level.
    #[serde(default = "default_star")]
    pub star: u8,

    /// Local position.
    pub position: HexCoord,

    /// Loot dropped on death.
    #[serde(default)]
    pub loot: Vec<LootTag>,
}

fn default_star() -> u8 {
    1
}

/// Hostile roster for a PvE round kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveData {
    /// Round kind this wave is used for.
    pub kind: RoundKind,

    /// Specific round, or any round of `kind` when `None`.
    #[serde(default)]
    pub round: Option<u32>,

    /// Units.
    pub units: Vec<WaveUnit>,
}
