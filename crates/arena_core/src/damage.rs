//! Damage formula shared by basic attacks, abilities and passives.
//!
//! The order of the steps matters:
//!
//! ```text
//! 1. Attuned damage resolves to the match element
//! 2. Crit:               x crit_damage%
//! 3. Outgoing bonus:     x (1 + bonus_damage%)
//! 4. Element affinity:   x (1 + affinity%)          (match element only)
//! 5. Mitigation:         x 100 / (armor + 100)      (physical)
//!                        x 100 / (mr + 100)         (magic, elemental)
//!                        x (1 - fire_resist%)       (fire only)
//! 6. Damage reduction:   x (1 - reduction%)         (clamped 0..=90)
//! 7. Floor, minimum 1
//! ```
//!
//! Percent bonuses stack multiplicatively before mitigation, and the floor
//! guarantees no unit is unkillable.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::{amplify, floor_u32, percent, Fixed};
use crate::stats::{DamageType, Element, UnitStats};

/// Minimum damage dealt by any hit.
pub const MIN_DAMAGE: u32 = 1;

/// Upper bound on `damage_reduction`.
pub const MAX_DAMAGE_REDUCTION: i32 = 90;

/// How a hit decides whether it crits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CritMode {
    /// Roll against the attacker's crit chance.
    #[default]
    Roll,
    /// Never crit (damage over time, reflects, passives).
    Never,
    /// Always crit (stealth bursts).
    Always,
}

/// Per-hit options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageOptions {
    /// Crit behavior.
    pub crit: CritMode,
    /// Extra outgoing percent stacked with `bonus_damage`.
    pub extra_bonus_pct: i32,
}

impl DamageOptions {
    /// Options for hits that never crit.
    #[must_use]
    pub const fn no_crit() -> Self {
        Self {
            crit: CritMode::Never,
            extra_bonus_pct: 0,
        }
    }
}

/// Match-wide inputs to the formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageContext {
    /// Element that `Attuned` resolves to.
    pub attuned: Element,
    /// Attacker team bonus for damage of the attuned element.
    pub affinity_pct: i32,
}

/// Result of one damage calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRoll {
    /// Final damage, never below [`MIN_DAMAGE`].
    pub amount: u32,
    /// Whether the hit crit.
    pub crit: bool,
    /// Damage type after resolving `Attuned`.
    pub damage_type: DamageType,
}

/// Calculate the damage of one hit.
#[must_use]
pub fn calculate_damage<R: Rng + ?Sized>(
    attacker: &UnitStats,
    target: &UnitStats,
    raw: u32,
    damage_type: DamageType,
    opts: DamageOptions,
    ctx: &DamageContext,
    rng: &mut R,
) -> DamageRoll {
    let damage_type = damage_type.resolve(ctx.attuned);
    let mut damage = Fixed::from_num(raw);

    let crit = match opts.crit {
        CritMode::Always => true,
        CritMode::Never => false,
        CritMode::Roll => rng.gen_range(0..100) < attacker.crit_chance,
    };
    if crit {
        damage *= percent(attacker.crit_damage.max(100));
    }

    damage = amplify(damage, attacker.bonus_damage + opts.extra_bonus_pct).max(Fixed::ZERO);

    if damage_type.element() == Some(ctx.attuned) {
        damage = amplify(damage, ctx.affinity_pct);
    }

    damage = mitigate(damage, target, damage_type);

    DamageRoll {
        amount: floor_u32(damage).max(MIN_DAMAGE),
        crit,
        damage_type,
    }
}

/// Apply resistances and damage reduction.
fn mitigate(damage: Fixed, target: &UnitStats, damage_type: DamageType) -> Fixed {
    let hundred = Fixed::from_num(100);
    let mitigated = match damage_type {
        DamageType::True => return damage,
        DamageType::Physical => damage * hundred / Fixed::from_num(target.armor.max(0) + 100),
        DamageType::Magic | DamageType::Elemental(_) | DamageType::Attuned => {
            damage * hundred / Fixed::from_num(target.magic_resist.max(0) + 100)
        }
    };

    let mitigated = if damage_type == DamageType::Elemental(Element::Fire) {
        mitigated * (Fixed::ONE - percent(target.fire_resist.clamp(0, 100)))
    } else {
        mitigated
    };

    let reduction = target.damage_reduction.clamp(0, MAX_DAMAGE_REDUCTION);
    mitigated * (Fixed::ONE - percent(reduction))
}
