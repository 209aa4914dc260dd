//! Hit resolution, death handling and ability casting.
//!
//! Damage is never applied at the moment it is decided: every damaging
//! branch goes through [`crate::damage::calculate_damage`] and queues a
//! [`PendingAttack`], so shields, lifesteal, thorns and deaths are handled
//! in one place when the hit lands.

use crate::ability::{
    Ability, AbilityEffect, BuffScope, BuffSpec, DamageSpec, FollowOn, HealSpec, StatusSpec,
};
use crate::damage::DamageOptions;
use crate::effects::Buff;
use crate::events::{CombatEventKind, DamageSource};
use crate::hex::Side;
use crate::math::scale_pct;
use crate::passives::buff_from_spec;
use crate::simulation::{CombatSimulator, HitFlags, PendingAttack};
use crate::stats::{DamageType, StatKind};
use crate::targeting::ability_targets;
use crate::unit::{BleedRider, Empowered, LootTag, UnitId};

impl CombatSimulator {
    /// Apply a hit whose land tick has arrived.
    pub(crate) fn resolve_hit(&mut self, attack: PendingAttack) {
        let attacker_alive = self
            .units
            .get(attack.attacker.index())
            .is_some_and(|u| u.alive);
        let Some(target) = self.units.get_mut(attack.target.index()) else {
            return;
        };
        if !target.alive {
            return;
        }
        if !attacker_alive && attack.cancelled_by_attacker_death() {
            tracing::trace!(
                attacker = attack.attacker.0,
                target = attack.target.0,
                "Melee hit cancelled"
            );
            return;
        }

        let damage = i32::try_from(attack.damage).unwrap_or(i32::MAX);
        let absorbed = target.shield.clamp(0, damage);
        target.shield -= absorbed;
        let to_health = damage - absorbed;
        let landed = u32::try_from(to_health).unwrap_or(0);
        target.health = target.health.saturating_sub(to_health);
        let remaining_health = target.health;
        let thorns_pct = target.passives.thorns_pct;
        if attack.source != DamageSource::DamageOverTime {
            let mana_on_hit = self.config.mana_on_hit;
            target.gain_mana(mana_on_hit);
        }

        self.emit(
            0,
            CombatEventKind::DamageApplied {
                attacker: attack.attacker,
                target: attack.target,
                amount: landed,
                absorbed: absorbed as u32,
                damage_type: attack.damage_type,
                crit: attack.crit,
                source: attack.source,
                remaining_health,
            },
        );

        if attacker_alive {
            let lifesteal = if attack.source == DamageSource::Attack {
                self.units[attack.attacker.index()].stats.lifesteal
            } else {
                0
            };
            // Shield-absorbed damage feeds neither lifesteal nor thorns.
            let heal = scale_pct(landed, lifesteal)
                + scale_pct(landed, i32::try_from(attack.heal_attacker_pct).unwrap_or(i32::MAX));
            if heal > 0 {
                self.heal_unit(attack.attacker, attack.attacker, heal);
            }

            let reflected = scale_pct(landed, thorns_pct);
            if attack.reflectable && reflected > 0 {
                self.queue_hit(
                    attack.target,
                    attack.attacker,
                    reflected,
                    DamageType::True,
                    DamageOptions::no_crit(),
                    HitFlags::effect(self.tick + 1, DamageSource::Reflect),
                );
            }
        }

        if remaining_health > 0 {
            if let Some(status) = attack.on_hit {
                self.apply_status(attack.attacker, attack.target, status);
            }
        } else {
            self.handle_death(attack.target, attack.attacker);
        }
    }

    /// Revive, or kill and run on-kill, death and loot effects.
    pub(crate) fn handle_death(&mut self, victim: UnitId, killer: UnitId) {
        let unit = &mut self.units[victim.index()];
        if let Some(pct) = unit.passives.revive_pct.filter(|_| !unit.has_revived) {
            unit.revive(pct);
            let health = unit.health;
            self.emit(0, CombatEventKind::Revive { unit: victim, health });
            return;
        }

        let killer = (killer != victim).then_some(killer);
        unit.kill(killer);
        let loot = std::mem::take(&mut unit.loot);
        let recipient = unit.side.opponent();
        self.emit(0, CombatEventKind::Death { unit: victim, killer });
        tracing::trace!(unit = victim.0, tick = self.tick, "Unit died");

        for tag in loot {
            self.award_loot(victim, recipient, tag);
        }

        let Some(killer) = killer else {
            return;
        };
        if self.units[killer.index()].side == recipient {
            self.run_on_kill(killer, victim);
            self.run_death_effects(killer, victim);
        }
    }

    /// Record a reward for `recipient`.
    pub(crate) fn award_loot(&mut self, unit: UnitId, recipient: Side, loot: LootTag) {
        self.loot.push((recipient, loot.clone()));
        self.emit(
            0,
            CombatEventKind::Loot {
                unit,
                recipient,
                loot,
            },
        );
    }

    /// Cast the caster's ability and empty its mana.
    pub(crate) fn cast_ability(&mut self, caster: UnitId) {
        let unit = &mut self.units[caster.index()];
        unit.mana = 0;
        let ability = unit.ability.clone().unwrap_or_else(|| {
            tracing::trace!(template = %unit.template, "No ability data, using fallback strike");
            Ability::fallback()
        });
        let land_tick = self.tick + self.config.ability_delay.max(1);

        let targets = match &ability.effect {
            AbilityEffect::Damage {
                damage,
                status,
                mana_burn,
                armor_shred,
            } => {
                let targets = self.select(caster, damage);
                for &target in &targets {
                    let mut opts = DamageOptions::default();
                    if let Some(burn) = mana_burn {
                        let victim = &mut self.units[target.index()];
                        if victim.has_full_mana() {
                            opts.extra_bonus_pct += burn.full_mana_bonus_pct;
                        }
                        victim.mana = (victim.mana - burn.amount).max(0);
                    }
                    if let Some(shred) = armor_shred {
                        self.grant_buff(
                            target,
                            Buff::timed(StatKind::Armor, -shred.amount, shred.duration_ticks),
                        );
                    }
                    self.queue_ability_hit(
                        caster,
                        target,
                        damage,
                        opts,
                        land_tick,
                        DamageSource::Ability,
                        *status,
                        0,
                    );
                }
                targets
            }
            AbilityEffect::AreaDamage { damage, status } => {
                let targets = self.select(caster, damage);
                for &target in &targets {
                    self.queue_ability_hit(
                        caster,
                        target,
                        damage,
                        DamageOptions::default(),
                        land_tick,
                        DamageSource::Splash,
                        *status,
                        0,
                    );
                }
                targets
            }
            AbilityEffect::Heal { heal } => self.cast_heal(caster, heal),
            AbilityEffect::HealAndDamage { heal, damage } => {
                let mut targets = self.cast_heal(caster, heal);
                let hit = self.select(caster, damage);
                for &target in &hit {
                    self.queue_ability_hit(
                        caster,
                        target,
                        damage,
                        DamageOptions::default(),
                        land_tick,
                        DamageSource::Ability,
                        None,
                        0,
                    );
                }
                targets.extend(hit);
                targets
            }
            AbilityEffect::DamageAndHeal {
                damage,
                self_heal_pct,
            } => {
                let targets = self.select(caster, damage);
                for &target in &targets {
                    self.queue_ability_hit(
                        caster,
                        target,
                        damage,
                        DamageOptions::default(),
                        land_tick,
                        DamageSource::Ability,
                        None,
                        *self_heal_pct,
                    );
                }
                targets
            }
            AbilityEffect::HealAndBuff { heal, buffs } => {
                let targets = self.cast_heal(caster, heal);
                for &target in &targets {
                    for spec in buffs {
                        self.grant_buff(target, buff_from_spec(*spec));
                    }
                }
                targets
            }
            AbilityEffect::DamageAndBuff {
                damage,
                buffs,
                scope,
            } => {
                let targets = self.select(caster, damage);
                for &target in &targets {
                    self.queue_ability_hit(
                        caster,
                        target,
                        damage,
                        DamageOptions::default(),
                        land_tick,
                        DamageSource::Ability,
                        None,
                        0,
                    );
                }
                self.buff_scope(caster, *scope, buffs);
                targets
            }
            AbilityEffect::Buff {
                buffs,
                scope,
                follow_on,
            } => {
                let targets = self.buff_scope(caster, *scope, buffs);
                if let Some(follow_on) = follow_on {
                    self.start_follow_on(caster, *follow_on);
                }
                targets
            }
            AbilityEffect::TeamBuff { grants } => {
                let targets = self.scope_members(caster, BuffScope::Team);
                for &target in &targets {
                    for grant in grants {
                        self.grant_buff(target, Buff::permanent(grant.stat, grant.value));
                    }
                }
                targets
            }
        };

        self.emit(
            self.config.ability_delay,
            CombatEventKind::AbilityCast {
                caster,
                ability: ability.name,
                targets,
            },
        );
    }

    fn select(&mut self, caster: UnitId, damage: &DamageSpec) -> Vec<UnitId> {
        ability_targets(&self.units, caster, damage.targets, self.tick, &mut self.rng)
    }

    fn queue_ability_hit(
        &mut self,
        caster: UnitId,
        target: UnitId,
        damage: &DamageSpec,
        opts: DamageOptions,
        land_tick: u32,
        source: DamageSource,
        status: Option<StatusSpec>,
        heal_attacker_pct: u32,
    ) {
        let raw = damage.raw(&self.units[caster.index()].stats);
        self.queue_hit(
            caster,
            target,
            raw,
            damage.damage_type,
            opts,
            HitFlags {
                on_hit: status,
                heal_attacker_pct,
                ..HitFlags::effect(land_tick, source)
            },
        );
    }

    /// Heal the selected units. Units below half health are healed twice as much.
    fn cast_heal(&mut self, caster: UnitId, heal: &HealSpec) -> Vec<UnitId> {
        let targets = ability_targets(&self.units, caster, heal.targets, self.tick, &mut self.rng);
        let base = scale_pct(heal.amount, self.units[caster.index()].stats.ability_power);
        for &target in &targets {
            let amount = if self.units[target.index()].is_below_half() {
                base * 2
            } else {
                base
            };
            self.heal_unit(caster, target, amount);
        }
        targets
    }

    /// Living allies covered by `scope`.
    fn scope_members(&self, caster: UnitId, scope: BuffScope) -> Vec<UnitId> {
        let me = &self.units[caster.index()];
        match scope {
            BuffScope::Caster => vec![caster],
            BuffScope::Team => self
                .units
                .iter()
                .filter(|u| u.alive && u.side == me.side)
                .map(|u| u.id)
                .collect(),
            BuffScope::Nearby(radius) => self
                .units
                .iter()
                .filter(|u| {
                    u.alive && u.side == me.side && u.position.distance(me.position) <= radius
                })
                .map(|u| u.id)
                .collect(),
        }
    }

    fn buff_scope(&mut self, caster: UnitId, scope: BuffScope, buffs: &[BuffSpec]) -> Vec<UnitId> {
        let targets = self.scope_members(caster, scope);
        for &target in &targets {
            for spec in buffs {
                self.grant_buff(target, buff_from_spec(*spec));
            }
        }
        targets
    }

    fn start_follow_on(&mut self, caster: UnitId, follow_on: FollowOn) {
        let tick = self.tick;
        let unit = &mut self.units[caster.index()];
        match follow_on {
            FollowOn::BleedOnAttack {
                dps,
                bleed_ticks,
                window_ticks,
            } => {
                unit.bleed_rider = Some(BleedRider {
                    dps,
                    bleed_ticks,
                    until_tick: tick + window_ticks,
                });
            }
            FollowOn::EmpoweredAttacks { count, bonus_pct } => {
                unit.empowered = (count > 0).then_some(Empowered {
                    remaining: count,
                    bonus_pct,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ability::{Ability, AbilityEffect, DamageSpec, ManaBurn, TargetMode};
    use crate::events::{CombatEventKind, DamageSource};
    use crate::hex::HexCoord;
    use crate::passives::UnitPassives;
    use crate::simulation::{CombatSimulator, CombatTeam, MatchVariables, SimConfig};
    use crate::stats::{DamageType, UnitStats};
    use crate::unit::{UnitId, UnitSpec};

    fn spec(x: i32, y: i32, stats: UnitStats, ability: Option<Ability>) -> UnitSpec {
        UnitSpec {
            instance_id: 0,
            template: "dummy".to_string(),
            star: 1,
            position: HexCoord::new(x, y),
            stats,
            ability,
            passives: UnitPassives::default(),
            traits: Vec::new(),
            loot: Vec::new(),
        }
    }

    fn started(home: Vec<UnitSpec>, away: Vec<UnitSpec>) -> CombatSimulator {
        let mut sim = CombatSimulator::new(
            CombatTeam::new("home", home),
            CombatTeam::new("away", away),
            MatchVariables::default(),
            SimConfig::default(),
            42,
        );
        sim.step();
        sim
    }

    #[test]
    fn test_shield_absorbs_first() {
        let mut sim = started(
            vec![spec(3, 0, UnitStats::default(), None)],
            vec![spec(3, 0, UnitStats::default(), None)],
        );
        sim.units[1].shield = 30;
        sim.resolve_hit(crate::simulation::PendingAttack {
            attacker: UnitId(0),
            target: UnitId(1),
            damage: 50,
            damage_type: DamageType::Physical,
            crit: false,
            land_tick: 0,
            source: DamageSource::Attack,
            ranged: false,
            reflectable: false,
            heal_attacker_pct: 0,
            on_hit: None,
        });
        assert_eq!(sim.units[1].shield, 0);
        assert_eq!(sim.units[1].health, 480);
    }

    #[test]
    fn test_revive_once() {
        let mut sim = started(
            vec![spec(3, 0, UnitStats::default(), None)],
            vec![spec(3, 0, UnitStats::default(), None)],
        );
        sim.units[1].passives.revive_pct = Some(50);
        sim.units[1].health = 0;
        sim.handle_death(UnitId(1), UnitId(0));
        assert!(sim.units[1].alive);
        assert_eq!(sim.units[1].health, 250);

        sim.units[1].health = 0;
        sim.handle_death(UnitId(1), UnitId(0));
        assert!(!sim.units[1].alive);
    }

    #[test]
    fn test_damage_ability_queues_pending_hits() {
        let nuke = Ability {
            name: "Nuke".to_string(),
            effect: AbilityEffect::Damage {
                damage: DamageSpec {
                    base: 100,
                    attack_ratio: 0,
                    damage_type: DamageType::Magic,
                    targets: TargetMode::AllEnemies,
                },
                status: None,
                mana_burn: Some(ManaBurn {
                    amount: 20,
                    full_mana_bonus_pct: 50,
                }),
                armor_shred: None,
            },
        };
        let mut sim = started(
            vec![spec(3, 0, UnitStats::default(), Some(nuke))],
            vec![
                spec(3, 0, UnitStats::default(), None),
                spec(5, 2, UnitStats::default(), None),
            ],
        );
        sim.units[1].mana = 30;
        let before = sim.units[1].health;

        sim.cast_ability(UnitId(0));
        assert_eq!(sim.pending.len(), 2);
        assert_eq!(sim.units[1].health, before);
        assert_eq!(sim.units[1].mana, 10);
        assert!(sim.events.iter().any(|e| matches!(
            &e.kind,
            CombatEventKind::AbilityCast { targets, .. } if targets.len() == 2
        )));
    }

    #[test]
    fn test_missing_ability_falls_back_to_strike() {
        let mut sim = started(
            vec![spec(3, 0, UnitStats::default(), None)],
            vec![spec(3, 0, UnitStats::default(), None)],
        );
        sim.units[0].target = Some(UnitId(1));
        sim.cast_ability(UnitId(0));
        assert_eq!(sim.pending.len(), 1);
        assert_eq!(sim.pending[0].target, UnitId(1));
        assert!(sim.events.iter().any(|e| matches!(
            &e.kind,
            CombatEventKind::AbilityCast { ability, .. } if ability == "Strike"
        )));
    }

    #[test]
    fn test_thorns_reflects_once() {
        let mut sim = started(
            vec![spec(3, 0, UnitStats::default(), None)],
            vec![spec(3, 0, UnitStats::default(), None)],
        );
        sim.units[1].passives.thorns_pct = 50;
        sim.units[0].passives.thorns_pct = 50;
        sim.resolve_hit(crate::simulation::PendingAttack {
            attacker: UnitId(0),
            target: UnitId(1),
            damage: 40,
            damage_type: DamageType::Physical,
            crit: false,
            land_tick: 0,
            source: DamageSource::Attack,
            ranged: false,
            reflectable: true,
            heal_attacker_pct: 0,
            on_hit: None,
        });
        assert_eq!(sim.pending.len(), 1);
        let reflect = sim.pending[0];
        assert_eq!(reflect.target, UnitId(0));
        assert_eq!(reflect.damage, 20);
        assert!(!reflect.reflectable);

        sim.pending.clear();
        sim.resolve_hit(reflect);
        assert!(sim.pending.is_empty());
    }

    fn attack_hit(damage: u32) -> crate::simulation::PendingAttack {
        crate::simulation::PendingAttack {
            attacker: UnitId(0),
            target: UnitId(1),
            damage,
            damage_type: DamageType::Physical,
            crit: false,
            land_tick: 0,
            source: DamageSource::Attack,
            ranged: false,
            reflectable: true,
            heal_attacker_pct: 0,
            on_hit: None,
        }
    }

    #[test]
    fn test_shielded_hit_feeds_no_thorns_or_lifesteal() {
        let mut sim = started(
            vec![spec(3, 0, UnitStats::default(), None)],
            vec![spec(3, 0, UnitStats::default(), None)],
        );
        sim.units[0].stats.lifesteal = 50;
        sim.units[0].health = 100;
        sim.units[1].passives.thorns_pct = 50;
        sim.units[1].shield = 60;
        sim.events.clear();

        sim.resolve_hit(attack_hit(40));
        assert_eq!(sim.units[1].shield, 20);
        assert!(sim.pending.is_empty());
        assert_eq!(sim.units[0].health, 100);
        assert!(sim.events.iter().any(|e| matches!(
            e.kind,
            CombatEventKind::DamageApplied {
                amount: 0,
                absorbed: 40,
                ..
            }
        )));
    }

    #[test]
    fn test_partial_shield_scales_from_landed_damage() {
        let mut sim = started(
            vec![spec(3, 0, UnitStats::default(), None)],
            vec![spec(3, 0, UnitStats::default(), None)],
        );
        sim.units[0].stats.lifesteal = 50;
        sim.units[0].health = 100;
        sim.units[1].passives.thorns_pct = 50;
        sim.units[1].shield = 20;

        sim.resolve_hit(attack_hit(60));
        assert_eq!(sim.units[0].health, 120);
        assert_eq!(sim.pending.len(), 1);
        assert_eq!(sim.pending[0].target, UnitId(0));
        assert_eq!(sim.pending[0].damage, 20);
    }
}
