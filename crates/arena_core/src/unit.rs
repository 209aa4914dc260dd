//! Per-combat unit model.
//!
//! A [`CombatUnit`] is built from a [`UnitSpec`] when a simulation starts and
//! is owned by that simulation alone. Units refer to each other only through
//! [`UnitId`], the unit's index in the simulator's arena, so a death never
//! leaves a dangling reference: dead units stay in the arena flagged as dead.

use serde::{Deserialize, Serialize};

use crate::ability::Ability;
use crate::effects::{Buff, Buffs, StatusEffects};
use crate::hex::{HexCoord, Side};
use crate::math::{percent, Fixed};
use crate::passives::UnitPassives;
use crate::stats::{StatKind, UnitStats};

/// Stable index of a unit inside one simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl UnitId {
    /// Arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Reward dropped when a unit carrying it dies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LootTag {
    /// Gold.
    Gold(u32),
    /// An item by id.
    Item(String),
    /// A unit by template.
    Unit {
        /// Template id.
        template: String,
        /// Star level.
        star: u8,
    },
}

/// Fully resolved input for one unit entering combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    /// Roster instance id.
    pub instance_id: u64,
    /// Template id.
    pub template: String,
    /// Star level.
    pub star: u8,
    /// Position in the owner's local half.
    pub position: HexCoord,
    /// Stats after trait, item and crest bonuses.
    pub stats: UnitStats,
    /// Ability; `None` falls back to a generic strike when mana fills.
    pub ability: Option<Ability>,
    /// Passive effects from items and traits.
    pub passives: UnitPassives,
    /// Trait tags.
    pub traits: Vec<String>,
    /// Loot dropped on death.
    pub loot: Vec<LootTag>,
}

/// Follow-on: basic attacks apply bleed until `until_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleedRider {
    /// Bleed damage per pulse.
    pub dps: u32,
    /// Bleed duration.
    pub bleed_ticks: u32,
    /// Last tick attacks apply bleed.
    pub until_tick: u32,
}

/// Follow-on: the next `remaining` basic attacks are empowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empowered {
    /// Attacks left.
    pub remaining: u32,
    /// Bonus damage percent.
    pub bonus_pct: i32,
}

/// A unit inside a running combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatUnit {
    /// Arena index.
    pub id: UnitId,
    /// Roster instance id.
    pub instance_id: u64,
    /// Template id.
    pub template: String,
    /// Star level.
    pub star: u8,
    /// Side of the board.
    pub side: Side,
    /// Owner label (player id or wave name).
    pub owner: String,
    /// Board position.
    pub position: HexCoord,
    /// Stats at combat start.
    pub base_stats: UnitStats,
    /// Working stats, mutated by buffs.
    pub stats: UnitStats,
    /// Current health.
    pub health: i32,
    /// Current mana.
    pub mana: i32,
    /// Damage absorbed before health.
    pub shield: i32,
    /// Ticks until the next basic attack.
    pub attack_cooldown: u32,
    /// Tick at which the current move completes.
    pub arrival_tick: u32,
    /// Current target.
    pub target: Option<UnitId>,
    /// Consecutive ticks without progress toward the target.
    pub stuck_ticks: u32,
    /// Basic attacks declared so far.
    pub total_attacks: u32,
    /// One-time revive already used.
    pub has_revived: bool,
    /// Charge stun already used.
    pub has_charged: bool,
    /// First attack already made.
    pub first_attack_done: bool,
    /// Alive flag. Dead units stay in the arena.
    pub alive: bool,
    /// Active buffs.
    pub buffs: Buffs,
    /// Active status effects.
    pub statuses: StatusEffects,
    /// Enemies cannot target this unit before this tick.
    pub untargetable_until: u32,
    /// Passive effects.
    pub passives: UnitPassives,
    /// Trait tags.
    pub traits: Vec<String>,
    /// Loot dropped on death.
    pub loot: Vec<LootTag>,
    /// Ability cast at full mana.
    pub ability: Option<Ability>,
    /// Bleed-on-attack follow-on.
    pub bleed_rider: Option<BleedRider>,
    /// Empowered-attacks follow-on.
    pub empowered: Option<Empowered>,
    /// Unit that dealt the killing blow.
    pub killer: Option<UnitId>,
}

impl CombatUnit {
    /// Build a combat unit from its spec. `spec.position` is mapped onto the
    /// board according to `side`.
    #[must_use]
    pub fn from_spec(id: UnitId, side: Side, owner: &str, spec: UnitSpec) -> Self {
        let stats = spec.stats;
        let untargetable_until = spec
            .passives
            .first_strike
            .map_or(0, |strike| strike.stealth_ticks);
        Self {
            id,
            instance_id: spec.instance_id,
            template: spec.template,
            star: spec.star,
            side,
            owner: owner.to_string(),
            position: side.to_board(spec.position),
            base_stats: stats,
            stats,
            health: stats.max_health.max(1),
            mana: stats.starting_mana.clamp(0, stats.max_mana.max(0)),
            shield: 0,
            attack_cooldown: 0,
            arrival_tick: 0,
            target: None,
            stuck_ticks: 0,
            total_attacks: 0,
            has_revived: false,
            has_charged: false,
            first_attack_done: false,
            alive: true,
            buffs: Buffs::default(),
            statuses: StatusEffects::default(),
            untargetable_until,
            passives: spec.passives,
            traits: spec.traits,
            loot: spec.loot,
            ability: spec.ability,
            bleed_rider: None,
            empowered: None,
            killer: None,
        }
    }

    /// Whether enemies may pick this unit as a target.
    #[must_use]
    pub fn is_targetable(&self, tick: u32) -> bool {
        self.alive && tick >= self.untargetable_until
    }

    /// Whether the unit is still travelling to its last cell.
    #[must_use]
    pub const fn is_moving(&self, tick: u32) -> bool {
        self.arrival_tick > tick
    }

    /// Whether the unit has a trait tag.
    #[must_use]
    pub fn has_trait(&self, tag: &str) -> bool {
        self.traits.iter().any(|t| t == tag)
    }

    /// Health as a fraction of max health.
    #[must_use]
    pub fn health_fraction(&self) -> Fixed {
        Fixed::from_num(self.health.max(0)) / Fixed::from_num(self.stats.max_health.max(1))
    }

    /// Whether health is below half.
    #[must_use]
    pub fn is_below_half(&self) -> bool {
        self.health * 2 < self.stats.max_health
    }

    /// Whether mana is full and the unit can cast.
    #[must_use]
    pub fn has_full_mana(&self) -> bool {
        self.stats.max_mana > 0 && self.mana >= self.stats.max_mana
    }

    /// Gain mana, capped at max. Stunned units and units without mana gain nothing.
    pub fn gain_mana(&mut self, amount: i32) {
        if self.stats.max_mana <= 0 || self.statuses.is_stunned() {
            return;
        }
        self.mana = (self.mana + amount).clamp(0, self.stats.max_mana);
    }

    /// Heal, capped at max health. Returns the amount actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if !self.alive {
            return 0;
        }
        let before = self.health;
        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
        self.health = self.health.saturating_add(amount).min(self.stats.max_health);
        (self.health - before).max(0) as u32
    }

    /// Add a shield.
    pub fn add_shield(&mut self, amount: u32) {
        self.shield = self
            .shield
            .saturating_add(i32::try_from(amount).unwrap_or(i32::MAX));
    }

    /// Apply a buff. Max health buffs also restore the granted health.
    pub fn apply_buff(&mut self, buff: Buff) {
        self.buffs.apply(&mut self.stats, buff);
        if buff.stat == StatKind::MaxHealth && buff.delta > 0 {
            self.health = self.health.saturating_add(buff.delta);
        }
        self.clamp_health();
    }

    /// Tick buff durations, reversing any that expire.
    pub fn advance_buffs(&mut self) -> Vec<Buff> {
        let expired = self.buffs.advance(&mut self.stats);
        if !expired.is_empty() {
            self.clamp_health();
        }
        expired
    }

    /// Restore `pct` of max health and clear combat state after a lethal hit.
    pub fn revive(&mut self, pct: i32) {
        let restored = Fixed::from_num(self.stats.max_health) * percent(pct);
        self.health = restored.to_num::<i32>().max(1);
        self.has_revived = true;
        self.shield = 0;
        self.statuses.clear();
    }

    /// Mark dead.
    pub fn kill(&mut self, killer: Option<UnitId>) {
        self.alive = false;
        self.health = 0;
        self.shield = 0;
        self.target = None;
        self.killer = killer;
        self.statuses.clear();
    }

    fn clamp_health(&mut self) {
        if self.alive {
            self.health = self.health.clamp(1, self.stats.max_health.max(1));
        }
    }
}
