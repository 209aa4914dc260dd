//! Ability definitions.
//!
//! Abilities are a closed set of effect variants, each carrying only the
//! fields it needs. The resolver in [`crate::resolver`] matches on them
//! exhaustively.

use serde::{Deserialize, Serialize};

use crate::effects::StatusKind;
use crate::math::scale_pct;
use crate::stats::{DamageType, StatGrant, StatKind, UnitStats};

/// How an ability picks the units it affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetMode {
    /// The caster's current target.
    #[default]
    CurrentTarget,
    /// Enemy with the least health.
    LowestHealthEnemy,
    /// Enemy with the most health.
    HighestHealthEnemy,
    /// Enemy farthest from the caster.
    FarthestEnemy,
    /// Enemy deepest in its own half.
    Backline,
    /// Ally (caster included) with the lowest health fraction.
    LowestHealthPercentAlly,
    /// Enemies within `radius` of the current target.
    EnemiesInRadius(u32),
    /// The current target and its adjacent enemies.
    AdjacentToTarget,
    /// Every living enemy.
    AllEnemies,
    /// Every living ally, caster included.
    AllAllies,
    /// Up to `n` distinct random enemies.
    RandomEnemies(u32),
    /// Enemies on the line from caster through the current target.
    Line {
        /// Hit every enemy on the line instead of only the first.
        piercing: bool,
    },
    /// The caster.
    SelfOnly,
}

/// Damage component of an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageSpec {
    /// Flat damage, scaled by ability power.
    pub base: u32,
    /// Percent of the caster's attack added on top.
    pub attack_ratio: u32,
    /// Damage type.
    pub damage_type: DamageType,
    /// Who gets hit.
    pub targets: TargetMode,
}

impl DamageSpec {
    /// Raw damage before the damage formula.
    #[must_use]
    pub fn raw(&self, caster: &UnitStats) -> u32 {
        let attack = caster.attack.max(0) as u32;
        scale_pct(self.base, caster.ability_power) + scale_pct(attack, self.attack_ratio as i32)
    }
}

/// Status applied by a damaging ability or attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSpec {
    /// Effect kind.
    pub kind: StatusKind,
    /// Duration in ticks.
    pub duration_ticks: u32,
    /// Damage per pulse for damage-over-time kinds.
    #[serde(default)]
    pub dps: u32,
    /// Slow percent for frost.
    #[serde(default)]
    pub slow_pct: i32,
}

/// Mana burn on hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManaBurn {
    /// Mana removed from each target.
    pub amount: i32,
    /// Bonus damage percent against targets at full mana.
    pub full_mana_bonus_pct: i32,
}

/// Timed armor reduction on hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmorShred {
    /// Armor removed.
    pub amount: i32,
    /// Ticks until the armor is restored.
    pub duration_ticks: u32,
}

/// Heal component of an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealSpec {
    /// Flat heal, scaled by ability power.
    pub amount: u32,
    /// Who gets healed.
    pub targets: TargetMode,
}

/// A stat buff granted by an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuffSpec {
    /// Buffed stat.
    pub stat: StatKind,
    /// Signed delta.
    pub value: i32,
    /// Duration in ticks; `None` lasts the whole combat.
    pub duration_ticks: Option<u32>,
}

/// Who receives the buffs of a buffing ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuffScope {
    /// The caster only.
    #[default]
    Caster,
    /// Every living ally, caster included.
    Team,
    /// Allies within `radius` of the caster.
    Nearby(u32),
}

/// Conditional effects that last while a buff is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FollowOn {
    /// Basic attacks apply bleed until `window_ticks` have passed.
    BleedOnAttack {
        /// Bleed damage per pulse.
        dps: u32,
        /// Bleed duration.
        bleed_ticks: u32,
        /// How long attacks keep applying bleed.
        window_ticks: u32,
    },
    /// The next `count` basic attacks deal `bonus_pct` more damage.
    EmpoweredAttacks {
        /// Number of attacks.
        count: u32,
        /// Bonus damage percent.
        bonus_pct: i32,
    },
}

/// What an ability does when cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbilityEffect {
    /// Damage to targets with optional riders.
    Damage {
        /// Damage component.
        damage: DamageSpec,
        /// Status applied to each target hit.
        #[serde(default)]
        status: Option<StatusSpec>,
        /// Mana burn applied to each target hit.
        #[serde(default)]
        mana_burn: Option<ManaBurn>,
        /// Armor shred applied to each target hit.
        #[serde(default)]
        armor_shred: Option<ArmorShred>,
    },
    /// Splash damage; hits are flagged as splash.
    AreaDamage {
        /// Damage component.
        damage: DamageSpec,
        /// Status applied to each target hit.
        #[serde(default)]
        status: Option<StatusSpec>,
    },
    /// Heal targets.
    Heal {
        /// Heal component.
        heal: HealSpec,
    },
    /// Heal allies and damage enemies.
    HealAndDamage {
        /// Heal component.
        heal: HealSpec,
        /// Damage component.
        damage: DamageSpec,
    },
    /// Damage enemies; the caster heals a percent of the damage dealt.
    DamageAndHeal {
        /// Damage component.
        damage: DamageSpec,
        /// Percent of dealt damage healed on landing.
        self_heal_pct: u32,
    },
    /// Heal targets and buff the same targets.
    HealAndBuff {
        /// Heal component.
        heal: HealSpec,
        /// Buffs for every healed unit.
        buffs: Vec<BuffSpec>,
    },
    /// Damage enemies and buff allies.
    DamageAndBuff {
        /// Damage component.
        damage: DamageSpec,
        /// Buffs granted.
        buffs: Vec<BuffSpec>,
        /// Who receives the buffs.
        scope: BuffScope,
    },
    /// Buff allies with an optional follow-on for the caster.
    Buff {
        /// Buffs granted.
        buffs: Vec<BuffSpec>,
        /// Who receives the buffs.
        scope: BuffScope,
        /// Conditional effect on the caster's next attacks.
        #[serde(default)]
        follow_on: Option<FollowOn>,
    },
    /// Permanent stat grant to every living ally.
    TeamBuff {
        /// Grants applied.
        grants: Vec<StatGrant>,
    },
}

/// A unit's ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    /// Display name.
    pub name: String,
    /// Effect when cast.
    pub effect: AbilityEffect,
}

impl Ability {
    /// Generic strike used when a template has no ability data: 3x attack
    /// as physical damage to the current target.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            name: "Strike".to_string(),
            effect: AbilityEffect::Damage {
                damage: DamageSpec {
                    base: 0,
                    attack_ratio: 300,
                    damage_type: DamageType::Physical,
                    targets: TargetMode::CurrentTarget,
                },
                status: None,
                mana_burn: None,
                armor_shred: None,
            },
        }
    }

    /// Whether the ability deals damage.
    #[must_use]
    pub const fn deals_damage(&self) -> bool {
        !matches!(
            self.effect,
            AbilityEffect::Heal { .. }
                | AbilityEffect::HealAndBuff { .. }
                | AbilityEffect::Buff { .. }
                | AbilityEffect::TeamBuff { .. }
        )
    }
}
