//! Passive effects from items and traits.
//!
//! Passives are plain data on a [`crate::unit::CombatUnit`]; the simulator
//! hooks that run them live here as well so each one can be tested alone.

use serde::{Deserialize, Serialize};

use crate::ability::{BuffSpec, StatusSpec};
use crate::damage::DamageOptions;
use crate::effects::Buff;
use crate::events::{CombatEventKind, DamageSource};
use crate::math::scale_pct;
use crate::simulation::{CombatSimulator, HitFlags};
use crate::stats::{DamageType, StatKind};
use crate::unit::{LootTag, UnitId};

/// Bonus granted once at combat start to adjacent allies sharing a trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyAura {
    /// Trait neighbors must carry.
    pub trait_tag: String,
    /// Attack granted.
    pub attack: i32,
    /// Armor granted.
    pub armor: i32,
}

/// Effect that runs once per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodicAura {
    /// Heal allies within `radius`, the owner included.
    HealAllies {
        /// Heal per second.
        amount: u32,
        /// Radius in hexes.
        radius: u32,
    },
    /// Heal the owner.
    Regen {
        /// Heal per second.
        amount: u32,
    },
}

/// Effect for the killer when it lands a killing blow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnKill {
    /// Timed or permanent buff.
    Buff(BuffSpec),
    /// Bonus gold for the owner.
    Gold(u32),
    /// Mana.
    Mana(i32),
    /// Shield.
    Shield(u32),
}

/// Effect the killer triggers at the victim's death.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathEffect {
    /// Damage arcs to the unit nearest the victim on the victim's side.
    Chain {
        /// Raw damage.
        amount: u32,
        /// Damage type.
        damage_type: DamageType,
    },
    /// Damage to every unit of the victim's side adjacent to the victim.
    Explosion {
        /// Raw damage.
        amount: u32,
        /// Damage type.
        damage_type: DamageType,
    },
}

/// Bonus on the unit's first attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirstStrike {
    /// Bonus damage percent.
    pub bonus_pct: i32,
    /// Untargetable from combat start for this many ticks or until the first
    /// attack. The first attack from stealth always crits.
    pub stealth_ticks: u32,
}

/// Bonus damage that grows with each basic attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ramp {
    /// Percent per attack made.
    pub per_attack_pct: i32,
    /// Cap.
    pub max_pct: i32,
}

/// Every passive a unit can carry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitPassives {
    /// Start-of-combat aura for same-trait neighbors.
    pub adjacency_aura: Option<AdjacencyAura>,
    /// Once-per-second effects.
    pub periodic: Vec<PeriodicAura>,
    /// Killing-blow effects.
    pub on_kill: Vec<OnKill>,
    /// Effects triggered at the death of a unit this one kills.
    pub death_effects: Vec<DeathEffect>,
    /// First attack bonus.
    pub first_strike: Option<FirstStrike>,
    /// Stun applied by the first melee attack.
    pub charge_stun_ticks: Option<u32>,
    /// Ramping attack bonus.
    pub ramp: Option<Ramp>,
    /// Percent of landed basic-attack damage reflected to the attacker.
    pub thorns_pct: i32,
    /// One-time revive at this percent of max health.
    pub revive_pct: Option<i32>,
    /// Status applied by every basic attack.
    pub on_hit: Option<StatusSpec>,
}

impl UnitPassives {
    /// Fold another passive set into this one. Scalar effects keep the stronger value.
    pub fn merge(&mut self, other: &UnitPassives) {
        if self.adjacency_aura.is_none() {
            self.adjacency_aura.clone_from(&other.adjacency_aura);
        }
        self.periodic.extend(other.periodic.iter().copied());
        self.on_kill.extend(other.on_kill.iter().copied());
        self.death_effects.extend(other.death_effects.iter().copied());
        self.first_strike = self.first_strike.or(other.first_strike);
        self.charge_stun_ticks = self.charge_stun_ticks.max(other.charge_stun_ticks);
        self.ramp = self.ramp.or(other.ramp);
        self.thorns_pct = self.thorns_pct.max(other.thorns_pct);
        self.revive_pct = self.revive_pct.max(other.revive_pct);
        self.on_hit = self.on_hit.or(other.on_hit);
    }
}

impl CombatSimulator {
    /// Grant adjacency aura bonuses. Runs once, before the first tick.
    pub(crate) fn apply_adjacency_auras(&mut self) {
        let mut grants: Vec<(UnitId, i32, i32)> = Vec::new();
        for source in &self.units {
            let Some(aura) = &source.passives.adjacency_aura else {
                continue;
            };
            for ally in &self.units {
                if ally.id != source.id
                    && ally.side == source.side
                    && ally.position.distance(source.position) == 1
                    && ally.has_trait(&aura.trait_tag)
                {
                    grants.push((ally.id, aura.attack, aura.armor));
                }
            }
        }

        for (id, attack, armor) in grants {
            for (stat, delta) in [(StatKind::Attack, attack), (StatKind::Armor, armor)] {
                if delta != 0 {
                    self.grant_buff(id, Buff::permanent(stat, delta));
                }
            }
        }
    }

    /// Run heal and regen auras. Called once every second of combat.
    pub(crate) fn run_periodic_auras(&mut self, ids: &[UnitId]) {
        for &id in ids {
            let source = &self.units[id.index()];
            if !source.alive || source.passives.periodic.is_empty() {
                continue;
            }
            let auras = source.passives.periodic.clone();
            let (side, position) = (source.side, source.position);

            for aura in auras {
                match aura {
                    PeriodicAura::Regen { amount } => self.heal_unit(id, id, amount),
                    PeriodicAura::HealAllies { amount, radius } => {
                        let allies: Vec<UnitId> = self
                            .units
                            .iter()
                            .filter(|u| {
                                u.alive && u.side == side && u.position.distance(position) <= radius
                            })
                            .map(|u| u.id)
                            .collect();
                        for ally in allies {
                            self.heal_unit(id, ally, amount);
                        }
                    }
                }
            }
        }
    }

    /// Run the killer's on-kill effects.
    pub(crate) fn run_on_kill(&mut self, killer: UnitId, victim: UnitId) {
        let Some(unit) = self.units.get(killer.index()) else {
            return;
        };
        if !unit.alive {
            return;
        }
        let effects = unit.passives.on_kill.clone();
        let side = unit.side;

        for effect in effects {
            match effect {
                OnKill::Buff(spec) => self.grant_buff(killer, buff_from_spec(spec)),
                OnKill::Gold(amount) => {
                    self.award_loot(victim, side, LootTag::Gold(amount));
                }
                OnKill::Mana(amount) => self.units[killer.index()].gain_mana(amount),
                OnKill::Shield(amount) => {
                    self.units[killer.index()].add_shield(amount);
                    self.emit(
                        0,
                        CombatEventKind::Shield {
                            source: killer,
                            target: killer,
                            amount,
                        },
                    );
                }
            }
        }
    }

    /// Trigger the killer's death effects around the victim.
    pub(crate) fn run_death_effects(&mut self, killer: UnitId, victim: UnitId) {
        let Some(unit) = self.units.get(killer.index()) else {
            return;
        };
        let effects = unit.passives.death_effects.clone();
        if effects.is_empty() {
            return;
        }
        let dead = &self.units[victim.index()];
        let (side, position) = (dead.side, dead.position);
        let land_tick = self.tick + 1;

        for effect in effects {
            match effect {
                DeathEffect::Chain {
                    amount,
                    damage_type,
                } => {
                    let nearest = self
                        .units
                        .iter()
                        .filter(|u| u.alive && u.side == side && u.id != victim)
                        .min_by_key(|u| (u.position.distance(position), u.id))
                        .map(|u| u.id);
                    if let Some(target) = nearest {
                        self.queue_passive_hit(killer, target, amount, damage_type, land_tick);
                    }
                }
                DeathEffect::Explosion {
                    amount,
                    damage_type,
                } => {
                    let neighbors: Vec<UnitId> = self
                        .units
                        .iter()
                        .filter(|u| u.alive && u.side == side && u.position.distance(position) == 1)
                        .map(|u| u.id)
                        .collect();
                    for target in neighbors {
                        self.queue_passive_hit(killer, target, amount, damage_type, land_tick);
                    }
                }
            }
        }
    }

    fn queue_passive_hit(
        &mut self,
        attacker: UnitId,
        target: UnitId,
        raw: u32,
        damage_type: DamageType,
        land_tick: u32,
    ) {
        self.queue_hit(
            attacker,
            target,
            raw,
            damage_type,
            DamageOptions::no_crit(),
            HitFlags::effect(land_tick, DamageSource::Passive),
        );
    }

    /// Heal `target` with the source team's heal bonus applied.
    pub(crate) fn heal_unit(&mut self, source: UnitId, target: UnitId, amount: u32) {
        let Some(healer) = self.units.get(source.index()) else {
            return;
        };
        let bonus = self.modifiers[healer.side.index()].heal_bonus_pct;
        let amount = scale_pct(amount, 100 + bonus);
        let Some(unit) = self.units.get_mut(target.index()) else {
            return;
        };
        let restored = unit.heal(amount);
        if restored > 0 {
            self.emit(
                0,
                CombatEventKind::Heal {
                    source,
                    target,
                    amount: restored,
                },
            );
        }
    }

    /// Apply a buff and record it.
    pub(crate) fn grant_buff(&mut self, target: UnitId, buff: Buff) {
        let Some(unit) = self.units.get_mut(target.index()) else {
            return;
        };
        if !unit.alive {
            return;
        }
        unit.apply_buff(buff);
        self.emit(
            0,
            CombatEventKind::Buff {
                target,
                stat: buff.stat,
                delta: buff.delta,
                duration: buff.remaining,
            },
        );
    }
}

/// Convert an ability or passive buff definition into a live buff.
pub(crate) fn buff_from_spec(spec: BuffSpec) -> Buff {
    match spec.duration_ticks {
        Some(ticks) => Buff::timed(spec.stat, spec.value, ticks),
        None => Buff::permanent(spec.stat, spec.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_stronger_scalars() {
        let mut base = UnitPassives {
            thorns_pct: 10,
            revive_pct: Some(30),
            ..UnitPassives::default()
        };
        let other = UnitPassives {
            thorns_pct: 25,
            revive_pct: Some(20),
            on_kill: vec![OnKill::Gold(1)],
            ..UnitPassives::default()
        };
        base.merge(&other);
        assert_eq!(base.thorns_pct, 25);
        assert_eq!(base.revive_pct, Some(30));
        assert_eq!(base.on_kill, vec![OnKill::Gold(1)]);
    }

    #[test]
    fn test_buff_from_spec() {
        let timed = buff_from_spec(BuffSpec {
            stat: StatKind::Attack,
            value: 10,
            duration_ticks: Some(40),
        });
        assert_eq!(timed.remaining, Some(40));
        let permanent = buff_from_spec(BuffSpec {
            stat: StatKind::Armor,
            value: 5,
            duration_ticks: None,
        });
        assert_eq!(permanent.remaining, None);
    }

    #[test]
    fn test_passives_parse_from_partial_ron() {
        let passives: UnitPassives =
            ron::from_str("(thorns_pct: 20, periodic: [Regen(amount: 15)])").expect("valid");
        assert_eq!(passives.thorns_pct, 20);
        assert_eq!(passives.periodic, vec![PeriodicAura::Regen { amount: 15 }]);
        assert!(passives.revive_pct.is_none());
    }
}
