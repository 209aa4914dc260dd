//! Combat event log.
//!
//! Events are appended in the order they happen and never mutated. Clients
//! replay them; the server never reads them back for game logic.

use serde::{Deserialize, Serialize};

use crate::effects::StatusKind;
use crate::error::{ArenaError, Result};
use crate::hex::{HexCoord, Side};
use crate::stats::{DamageType, StatKind};
use crate::unit::{CombatUnit, LootTag, UnitId};

/// Outcome of one combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatWinner {
    /// The host side won.
    Home,
    /// The visiting side won.
    Away,
    /// Both sides were wiped out.
    Draw,
}

impl CombatWinner {
    /// The winning side, if any.
    #[must_use]
    pub const fn side(self) -> Option<Side> {
        match self {
            CombatWinner::Home => Some(Side::Home),
            CombatWinner::Away => Some(Side::Away),
            CombatWinner::Draw => None,
        }
    }
}

/// What produced a damage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageSource {
    /// Basic attack.
    Attack,
    /// Ability hit.
    Ability,
    /// Area ability hit.
    Splash,
    /// Damage-over-time pulse.
    DamageOverTime,
    /// Thorns reflect.
    Reflect,
    /// Passive effect such as an on-death explosion.
    Passive,
}

/// Unit state captured at combat start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Arena id.
    pub id: UnitId,
    /// Roster instance id.
    pub instance_id: u64,
    /// Template id.
    pub template: String,
    /// Star level.
    pub star: u8,
    /// Side.
    pub side: Side,
    /// Owner label.
    pub owner: String,
    /// Board position.
    pub position: HexCoord,
    /// Health.
    pub health: i32,
    /// Max health.
    pub max_health: i32,
    /// Mana.
    pub mana: i32,
    /// Max mana.
    pub max_mana: i32,
}

impl From<&CombatUnit> for UnitSnapshot {
    fn from(unit: &CombatUnit) -> Self {
        Self {
            id: unit.id,
            instance_id: unit.instance_id,
            template: unit.template.clone(),
            star: unit.star,
            side: unit.side,
            owner: unit.owner.clone(),
            position: unit.position,
            health: unit.health,
            max_health: unit.stats.max_health,
            mana: unit.mana,
            max_mana: unit.stats.max_mana,
        }
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatEventKind {
    /// Initial state of every unit.
    CombatStart {
        /// Units in id order.
        units: Vec<UnitSnapshot>,
    },
    /// A unit started moving to an adjacent cell.
    Move {
        /// Moving unit.
        unit: UnitId,
        /// Origin.
        from: HexCoord,
        /// Destination.
        to: HexCoord,
    },
    /// A basic attack was committed.
    AttackDeclared {
        /// Attacker.
        attacker: UnitId,
        /// Target.
        target: UnitId,
        /// Ranged attacks still land if the attacker dies.
        ranged: bool,
        /// Tick the hit lands.
        land_tick: u32,
    },
    /// An ability was cast.
    AbilityCast {
        /// Caster.
        caster: UnitId,
        /// Ability name.
        ability: String,
        /// Units selected by the ability.
        targets: Vec<UnitId>,
    },
    /// Damage landed.
    DamageApplied {
        /// Dealer.
        attacker: UnitId,
        /// Receiver.
        target: UnitId,
        /// Damage to health.
        amount: u32,
        /// Damage absorbed by shields.
        absorbed: u32,
        /// Resolved damage type.
        damage_type: DamageType,
        /// Whether the hit crit.
        crit: bool,
        /// What produced the hit.
        source: DamageSource,
        /// Receiver health afterwards.
        remaining_health: i32,
    },
    /// Health restored.
    Heal {
        /// Healer.
        source: UnitId,
        /// Healed unit.
        target: UnitId,
        /// Amount restored.
        amount: u32,
    },
    /// Shield granted.
    Shield {
        /// Granting unit.
        source: UnitId,
        /// Shielded unit.
        target: UnitId,
        /// Shield amount.
        amount: u32,
    },
    /// Stat buff applied.
    Buff {
        /// Buffed unit.
        target: UnitId,
        /// Stat.
        stat: StatKind,
        /// Signed delta.
        delta: i32,
        /// Duration, `None` for permanent.
        duration: Option<u32>,
    },
    /// Status effect applied or refreshed.
    StatusApplied {
        /// Source unit.
        source: UnitId,
        /// Affected unit.
        target: UnitId,
        /// Effect kind.
        status: StatusKind,
        /// Duration after refresh.
        duration: u32,
    },
    /// A unit died.
    Death {
        /// Dead unit.
        unit: UnitId,
        /// Killer, if known.
        killer: Option<UnitId>,
    },
    /// A unit came back from a lethal hit.
    Revive {
        /// Revived unit.
        unit: UnitId,
        /// Health after revive.
        health: i32,
    },
    /// Reward earned by `recipient`.
    Loot {
        /// Unit whose death or kill produced the reward.
        unit: UnitId,
        /// Side receiving the reward.
        recipient: Side,
        /// The reward.
        loot: LootTag,
    },
    /// Combat finished.
    CombatEnd {
        /// Winner.
        winner: CombatWinner,
        /// Damage dealt to the losing player.
        damage: u32,
        /// Ticks simulated.
        duration_ticks: u32,
    },
}

/// One timestamped entry in the combat log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEvent {
    /// Tick at which it happened.
    pub tick: u32,
    /// Animation length hint in ticks.
    pub duration: u32,
    /// Payload.
    pub kind: CombatEventKind,
}

/// Serialize an event log to compact bytes.
///
/// # Errors
///
/// Returns `ArenaError::InvalidState` if encoding fails.
pub fn encode_log(events: &[CombatEvent]) -> Result<Vec<u8>> {
    bincode::serialize(events)
        .map_err(|e| ArenaError::InvalidState(format!("Failed to encode combat log: {e}")))
}

/// Decode an event log produced by [`encode_log`].
///
/// # Errors
///
/// Returns `ArenaError::InvalidState` if the bytes are not a valid log.
pub fn decode_log(bytes: &[u8]) -> Result<Vec<CombatEvent>> {
    bincode::deserialize(bytes)
        .map_err(|e| ArenaError::InvalidState(format!("Failed to decode combat log: {e}")))
}
