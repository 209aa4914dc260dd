//! Tick-based combat simulator.
//!
//! A [`CombatSimulator`] resolves two teams into an ordered event log and a
//! winner. It is a pure function of its inputs: the teams, the match
//! variables, the [`SimConfig`] and an RNG seed.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`crate::math::Fixed`])
//! - One seeded `ChaCha8Rng` per combat for crits and random targeting
//! - Units are processed in id order every phase
//!
//! # Tick order
//!
//! 1. Status effects, buff expiry, cooldowns
//! 2. Periodic auras (once per second)
//! 3. Pending attacks that are due
//! 4. Target maintenance and movement decisions against one position snapshot
//! 5. Moves, re-checking live occupancy
//! 6. Basic attacks and ability casts
//! 7. Termination check
//!
//! # Example
//!
//! ```
//! use arena_core::hex::HexCoord;
//! use arena_core::passives::UnitPassives;
//! use arena_core::simulation::{CombatSimulator, CombatTeam, MatchVariables, SimConfig};
//! use arena_core::stats::UnitStats;
//! use arena_core::unit::UnitSpec;
//!
//! let knight = |id: u64| UnitSpec {
//!     instance_id: id,
//!     template: "knight".to_string(),
//!     star: 1,
//!     position: HexCoord::new(3, 0),
//!     stats: UnitStats::default(),
//!     ability: None,
//!     passives: UnitPassives::default(),
//!     traits: Vec::new(),
//!     loot: Vec::new(),
//! };
//!
//! let home = CombatTeam::new("alice", vec![knight(1)]);
//! let away = CombatTeam::new("bob", vec![knight(2)]);
//! let result = CombatSimulator::new(home, away, MatchVariables::default(), SimConfig::default(), 7).run();
//! assert!(result.duration_ticks <= SimConfig::default().max_ticks);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::ability::StatusSpec;
use crate::damage::{calculate_damage, CritMode, DamageContext, DamageOptions};
use crate::effects::{StatusEffect, StatusKind};
use crate::events::{CombatEvent, CombatEventKind, CombatWinner, DamageSource, UnitSnapshot};
use crate::hex::{is_valid_deploy, HexCoord, Side, BOARD_WIDTH, HALF_HEIGHT};
use crate::math::scale_pct;
use crate::pathfinding::next_step;
use crate::stats::{DamageType, Element, StatGrant, StatKind};
use crate::targeting::nearest_enemy;
use crate::unit::{CombatUnit, LootTag, UnitId, UnitSpec};

/// Ticks per second.
pub const TICK_RATE: u32 = 20;

/// Hard cap on combat length (60 seconds).
pub const MAX_COMBAT_TICKS: u32 = 60 * TICK_RATE;

/// Highest slow percent that still lets a unit act.
const MAX_SLOW_PCT: i32 = 90;

/// Timing constants for one combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Tick cap.
    pub max_ticks: u32,
    /// Ticks between a melee attack and its hit.
    pub melee_hit_delay: u32,
    /// Base flight time of a ranged attack.
    pub ranged_base_delay: u32,
    /// Extra flight time per hex of distance.
    pub ranged_delay_per_hex: u32,
    /// Ticks between an ability cast and its hits.
    pub ability_delay: u32,
    /// Mana gained per basic attack.
    pub mana_per_attack: i32,
    /// Mana gained when taking a hit.
    pub mana_on_hit: i32,
    /// Consecutive stuck ticks before forcing a new target.
    pub stuck_threshold: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            max_ticks: MAX_COMBAT_TICKS,
            melee_hit_delay: 5,
            ranged_base_delay: 4,
            ranged_delay_per_hex: 2,
            ability_delay: 3,
            mana_per_attack: 10,
            mana_on_hit: 5,
            stuck_threshold: 10,
        }
    }
}

/// Boost for the strongest unit on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarlordBoost {
    /// Max health percent gained.
    pub health_pct: i32,
    /// Attack percent gained.
    pub attack_pct: i32,
}

/// Per-match random variables, rolled once and read-only during combat.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchVariables {
    /// Element that attuned damage resolves to.
    pub attuned_element: Element,
    /// Grants applied to every unit on both sides.
    pub blessing: Vec<StatGrant>,
    /// Boost for each side's strongest unit.
    pub warlord: Option<WarlordBoost>,
}

/// Team-wide modifiers from traits and crests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamModifiers {
    /// Extra healing percent.
    pub heal_bonus_pct: i32,
    /// Extra damage percent for the attuned element.
    pub affinity_pct: i32,
}

/// One side's input to a combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatTeam {
    /// Owner label.
    pub owner: String,
    /// Units with local positions.
    pub units: Vec<UnitSpec>,
    /// Team-wide modifiers.
    pub modifiers: TeamModifiers,
}

impl TeamModifiers {
    /// Sum two modifier sets.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        Self {
            heal_bonus_pct: self.heal_bonus_pct + other.heal_bonus_pct,
            affinity_pct: self.affinity_pct + other.affinity_pct,
        }
    }
}

impl CombatTeam {
    /// A team without modifiers.
    #[must_use]
    pub fn new(owner: impl Into<String>, units: Vec<UnitSpec>) -> Self {
        Self {
            owner: owner.into(),
            units,
            modifiers: TeamModifiers::default(),
        }
    }
}

/// A hit committed but not yet applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttack {
    /// Dealer.
    pub attacker: UnitId,
    /// Receiver.
    pub target: UnitId,
    /// Final damage from the damage formula.
    pub damage: u32,
    /// Resolved damage type.
    pub damage_type: DamageType,
    /// Whether the hit crit.
    pub crit: bool,
    /// Tick at which it lands.
    pub land_tick: u32,
    /// What produced it.
    pub source: DamageSource,
    /// Projectile: lands even if the attacker dies.
    pub ranged: bool,
    /// Thorns may reflect it.
    pub reflectable: bool,
    /// Percent of the damage healed to the attacker on landing.
    pub heal_attacker_pct: u32,
    /// Status applied to the target on landing.
    pub on_hit: Option<StatusSpec>,
}

impl PendingAttack {
    /// Melee basic attacks are cancelled when the attacker dies first.
    #[must_use]
    pub const fn cancelled_by_attacker_death(&self) -> bool {
        matches!(self.source, DamageSource::Attack) && !self.ranged
    }
}

/// Simulator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimState {
    /// Built, first tick not run.
    NotStarted,
    /// Ticking.
    Running,
    /// Finished; the result is available.
    Ended,
}

/// Outcome of a combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatResult {
    /// Winner.
    pub winner: CombatWinner,
    /// Damage to the losing player: `1 + surviving winning units`.
    pub damage: u32,
    /// Ticks simulated.
    pub duration_ticks: u32,
    /// Living units of the winning side.
    pub surviving: u32,
    /// Summed remaining health per side, indexed by [`Side::index`].
    pub remaining_health: [i64; 2],
    /// Rewards earned, with the side that earned them.
    pub loot: Vec<(Side, LootTag)>,
    /// Full event log.
    pub events: Vec<CombatEvent>,
}

impl CombatResult {
    /// The losing side, if any.
    #[must_use]
    pub const fn loser(&self) -> Option<Side> {
        match self.winner.side() {
            Some(side) => Some(side.opponent()),
            None => None,
        }
    }

    /// Rewards earned by `side`.
    pub fn loot_for(&self, side: Side) -> impl Iterator<Item = &LootTag> {
        self.loot
            .iter()
            .filter(move |(s, _)| *s == side)
            .map(|(_, tag)| tag)
    }
}

/// The combat simulator.
#[derive(Debug, Clone)]
pub struct CombatSimulator {
    pub(crate) config: SimConfig,
    pub(crate) vars: MatchVariables,
    pub(crate) modifiers: [TeamModifiers; 2],
    pub(crate) units: Vec<CombatUnit>,
    pub(crate) pending: Vec<PendingAttack>,
    pub(crate) events: Vec<CombatEvent>,
    pub(crate) loot: Vec<(Side, LootTag)>,
    pub(crate) tick: u32,
    pub(crate) state: SimState,
    pub(crate) rng: ChaCha8Rng,
    result: Option<CombatResult>,
}

impl CombatSimulator {
    /// Build a simulator. `home` is the host and fights from rows 4..=7.
    #[must_use]
    pub fn new(
        home: CombatTeam,
        away: CombatTeam,
        vars: MatchVariables,
        config: SimConfig,
        seed: u64,
    ) -> Self {
        let mut units = Vec::with_capacity(home.units.len() + away.units.len());
        let modifiers = [home.modifiers, away.modifiers];
        place_team(&mut units, home, Side::Home);
        place_team(&mut units, away, Side::Away);

        Self {
            config,
            vars,
            modifiers,
            units,
            pending: Vec::new(),
            events: Vec::new(),
            loot: Vec::new(),
            tick: 0,
            state: SimState::NotStarted,
            rng: ChaCha8Rng::seed_from_u64(seed),
            result: None,
        }
    }

    /// Current tick.
    #[must_use]
    pub const fn tick(&self) -> u32 {
        self.tick
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SimState {
        self.state
    }

    /// All units, dead ones included, in id order.
    #[must_use]
    pub fn units(&self) -> &[CombatUnit] {
        &self.units
    }

    /// Look up a unit.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&CombatUnit> {
        self.units.get(id.index())
    }

    /// Hits in flight.
    #[must_use]
    pub fn pending(&self) -> &[PendingAttack] {
        &self.pending
    }

    /// Events emitted so far.
    #[must_use]
    pub fn events(&self) -> &[CombatEvent] {
        &self.events
    }

    /// Result, once ended.
    #[must_use]
    pub fn result(&self) -> Option<&CombatResult> {
        self.result.as_ref()
    }

    /// Mutable unit access for scenario setup before the first tick.
    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut CombatUnit> {
        self.units.get_mut(id.index())
    }

    /// Run to completion and return the result.
    #[must_use]
    pub fn run(mut self) -> CombatResult {
        while self.state != SimState::Ended {
            self.step();
        }
        self.result.unwrap_or_else(|| CombatResult {
            winner: CombatWinner::Draw,
            damage: 0,
            duration_ticks: self.tick,
            surviving: 0,
            remaining_health: [0, 0],
            loot: Vec::new(),
            events: self.events,
        })
    }

    /// Advance one tick. Starting the combat counts as the first step.
    pub fn step(&mut self) {
        match self.state {
            SimState::Ended => return,
            SimState::NotStarted => {
                self.start();
                return;
            }
            SimState::Running => {}
        }

        self.tick += 1;
        let ids: Vec<UnitId> = self.units.iter().map(|u| u.id).collect();

        // 1. Statuses, buffs, cooldowns
        self.run_status_phase(&ids);

        // 2. Periodic auras
        if self.tick % self.config.tick_rate.max(1) == 0 {
            self.run_periodic_auras(&ids);
        }

        // 3. Pending attacks
        self.resolve_pending();

        // 4. Targets, then movement decisions against one snapshot
        for &id in &ids {
            self.update_target(id);
        }
        let moves = self.decide_moves(&ids);

        // 5. Moves
        self.apply_moves(moves);

        // 6. Attacks and casts
        for &id in &ids {
            self.try_attack(id);
        }

        // 7. Termination
        self.check_end();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::trace!(tick = self.tick, state_hash = hash, "Combat state hash");
        }
    }

    fn start(&mut self) {
        self.apply_match_variables();
        let units = self.units.iter().map(UnitSnapshot::from).collect();
        self.emit(0, CombatEventKind::CombatStart { units });
        self.apply_adjacency_auras();
        self.state = SimState::Running;
        tracing::debug!(units = self.units.len(), "Combat started");
    }

    fn apply_match_variables(&mut self) {
        for unit in &mut self.units {
            unit.stats.apply_grants(&self.vars.blessing);
            unit.base_stats = unit.stats;
            unit.health = unit.stats.max_health.max(1);
        }

        let Some(boost) = self.vars.warlord else {
            return;
        };
        for side in [Side::Home, Side::Away] {
            let strongest = self
                .units
                .iter()
                .filter(|u| u.side == side)
                .max_by_key(|u| (u.star, u.stats.max_health, std::cmp::Reverse(u.id)))
                .map(|u| u.id);
            if let Some(id) = strongest {
                let unit = &mut self.units[id.index()];
                let health = scale_pct(unit.stats.max_health.max(0) as u32, boost.health_pct);
                let attack = scale_pct(unit.stats.attack.max(0) as u32, boost.attack_pct);
                unit.stats.add(StatKind::MaxHealth, health as i32);
                unit.stats.add(StatKind::Attack, attack as i32);
                unit.base_stats = unit.stats;
                unit.health = unit.stats.max_health;
            }
        }
    }

    pub(crate) fn emit(&mut self, duration: u32, kind: CombatEventKind) {
        self.events.push(CombatEvent {
            tick: self.tick,
            duration,
            kind,
        });
    }

    pub(crate) fn damage_context(&self, side: Side) -> DamageContext {
        DamageContext {
            attuned: self.vars.attuned_element,
            affinity_pct: self.modifiers[side.index()].affinity_pct,
        }
    }

    fn run_status_phase(&mut self, ids: &[UnitId]) {
        let tick = self.tick;
        for &id in ids {
            let unit = &mut self.units[id.index()];
            if !unit.alive {
                continue;
            }
            let pulses = unit.statuses.advance(tick);
            unit.advance_buffs();
            unit.attack_cooldown = unit.attack_cooldown.saturating_sub(1);
            if unit.bleed_rider.is_some_and(|rider| rider.until_tick < tick) {
                unit.bleed_rider = None;
            }

            for pulse in pulses {
                self.queue_hit(
                    pulse.source,
                    id,
                    pulse.amount,
                    DamageType::True,
                    DamageOptions::no_crit(),
                    HitFlags::damage_over_time(tick),
                );
            }
        }
    }

    /// Compute damage through the formula and queue the hit.
    pub(crate) fn queue_hit(
        &mut self,
        attacker: UnitId,
        target: UnitId,
        raw: u32,
        damage_type: DamageType,
        opts: DamageOptions,
        flags: HitFlags,
    ) {
        let (Some(source), Some(receiver)) = (self.unit(attacker), self.unit(target)) else {
            return;
        };
        let ctx = self.damage_context(source.side);
        let (attacker_stats, target_stats) = (source.stats, receiver.stats);
        let roll = calculate_damage(
            &attacker_stats,
            &target_stats,
            raw,
            damage_type,
            opts,
            &ctx,
            &mut self.rng,
        );
        self.pending.push(PendingAttack {
            attacker,
            target,
            damage: roll.amount,
            damage_type: roll.damage_type,
            crit: roll.crit,
            land_tick: flags.land_tick,
            source: flags.source,
            ranged: flags.ranged,
            reflectable: flags.reflectable,
            heal_attacker_pct: flags.heal_attacker_pct,
            on_hit: flags.on_hit,
        });
    }

    fn resolve_pending(&mut self) {
        let tick = self.tick;
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.land_tick <= tick);
        self.pending = later;
        for attack in due {
            self.resolve_hit(attack);
        }
    }

    fn update_target(&mut self, id: UnitId) {
        let tick = self.tick;
        let unit = &self.units[id.index()];
        if !unit.alive {
            return;
        }

        let range = unit.stats.range.max(1) as u32;
        let current = unit
            .target
            .and_then(|t| self.units.get(t.index()))
            .filter(|t| t.is_targetable(tick) && t.side != unit.side);

        let mut new_target = match current {
            None => nearest_enemy(&self.units, id, tick, None),
            Some(target) if unit.position.distance(target.position) > range => {
                let closer = nearest_enemy(&self.units, id, tick, None).filter(|&c| {
                    self.units[c.index()].position.distance(unit.position) <= range
                });
                closer.or(Some(target.id))
            }
            Some(target) => Some(target.id),
        };

        // Only a target kept this tick can be the one the unit is stuck on.
        if new_target == unit.target && unit.stuck_ticks >= self.config.stuck_threshold {
            if let Some(alternative) = nearest_enemy(&self.units, id, tick, unit.target) {
                tracing::trace!(unit = id.0, "Stuck, switching target");
                new_target = Some(alternative);
            }
            self.units[id.index()].stuck_ticks = 0;
        }

        let unit = &mut self.units[id.index()];
        if new_target != unit.target {
            unit.target = new_target;
            unit.stuck_ticks = 0;
        }
    }

    fn decide_moves(&mut self, ids: &[UnitId]) -> Vec<(UnitId, HexCoord)> {
        let tick = self.tick;
        let occupied: HashSet<HexCoord> = self
            .units
            .iter()
            .filter(|u| u.alive)
            .map(|u| u.position)
            .collect();

        let mut moves = Vec::new();
        for &id in ids {
            let unit = &self.units[id.index()];
            if !unit.alive || unit.is_moving(tick) || unit.statuses.is_immobile() {
                continue;
            }
            let Some(target) = unit.target.and_then(|t| self.units.get(t.index())) else {
                continue;
            };
            let range = unit.stats.range.max(1) as u32;
            if unit.position.distance(target.position) <= range {
                self.units[id.index()].stuck_ticks = 0;
                continue;
            }

            match next_step(unit.position, range, target.position, |c| {
                occupied.contains(&c)
            }) {
                Some(step) => moves.push((id, step)),
                None => self.units[id.index()].stuck_ticks += 1,
            }
        }
        moves
    }

    fn apply_moves(&mut self, moves: Vec<(UnitId, HexCoord)>) {
        let tick = self.tick;
        let tick_rate = self.config.tick_rate;
        let mut occupied: HashSet<HexCoord> = self
            .units
            .iter()
            .filter(|u| u.alive)
            .map(|u| u.position)
            .collect();

        for (id, to) in moves {
            let unit = &mut self.units[id.index()];
            if !unit.alive || occupied.contains(&to) {
                unit.stuck_ticks += 1;
                continue;
            }
            let from = unit.position;
            let ticks = slowed(unit.stats.ticks_per_hex(tick_rate), unit.statuses.slow_pct());
            occupied.remove(&from);
            occupied.insert(to);
            unit.position = to;
            unit.arrival_tick = tick + ticks;
            unit.stuck_ticks = 0;
            self.emit(ticks, CombatEventKind::Move { unit: id, from, to });
        }
    }

    fn try_attack(&mut self, id: UnitId) {
        let tick = self.tick;
        let unit = &self.units[id.index()];
        if !unit.alive
            || unit.statuses.is_stunned()
            || unit.is_moving(tick)
            || unit.attack_cooldown > 0
        {
            return;
        }
        let Some(target) = unit.target.and_then(|t| self.units.get(t.index())) else {
            return;
        };
        if !target.is_targetable(tick) {
            return;
        }
        let distance = unit.position.distance(target.position);
        if distance > unit.stats.range.max(1) as u32 {
            return;
        }
        let ranged = unit.stats.is_ranged();
        if !ranged && target.is_moving(tick) {
            return;
        }

        let target_id = target.id;
        let interval = slowed(
            unit.stats.attack_interval(self.config.tick_rate),
            unit.statuses.slow_pct(),
        );
        let casts = unit.has_full_mana();
        self.units[id.index()].attack_cooldown = interval;

        if casts {
            self.cast_ability(id);
        } else {
            self.basic_attack(id, target_id, distance, ranged);
        }
    }

    fn basic_attack(&mut self, id: UnitId, target: UnitId, distance: u32, ranged: bool) {
        let tick = self.tick;
        let land_tick = if ranged {
            tick + self.config.ranged_base_delay + self.config.ranged_delay_per_hex * distance
        } else {
            tick + self.config.melee_hit_delay
        };

        let unit = &mut self.units[id.index()];
        let mut opts = DamageOptions::default();

        if let Some(ramp) = unit.passives.ramp {
            let stacks = i32::try_from(unit.total_attacks).unwrap_or(i32::MAX);
            opts.extra_bonus_pct += stacks.saturating_mul(ramp.per_attack_pct).min(ramp.max_pct);
        }
        if let Some(empowered) = unit.empowered.as_mut() {
            opts.extra_bonus_pct += empowered.bonus_pct;
            empowered.remaining = empowered.remaining.saturating_sub(1);
            if empowered.remaining == 0 {
                unit.empowered = None;
            }
        }
        if !unit.first_attack_done {
            if let Some(strike) = unit.passives.first_strike {
                opts.extra_bonus_pct += strike.bonus_pct;
                if unit.untargetable_until > tick {
                    opts.crit = CritMode::Always;
                }
            }
            unit.untargetable_until = unit.untargetable_until.min(tick);
        }
        let charge_stun = if !ranged && !unit.has_charged {
            unit.passives.charge_stun_ticks
        } else {
            None
        };
        if charge_stun.is_some() {
            unit.has_charged = true;
        }

        let on_hit = unit
            .bleed_rider
            .map(|rider| StatusSpec {
                kind: StatusKind::Bleed,
                duration_ticks: rider.bleed_ticks,
                dps: rider.dps,
                slow_pct: 0,
            })
            .or(unit.passives.on_hit);
        let raw = unit.stats.attack.max(0) as u32;
        unit.total_attacks += 1;
        unit.first_attack_done = true;
        let mana_per_attack = self.config.mana_per_attack;
        unit.gain_mana(mana_per_attack);

        self.emit(
            land_tick - tick,
            CombatEventKind::AttackDeclared {
                attacker: id,
                target,
                ranged,
                land_tick,
            },
        );

        if let Some(duration) = charge_stun {
            self.apply_status(
                id,
                target,
                StatusSpec {
                    kind: StatusKind::Stun,
                    duration_ticks: duration,
                    dps: 0,
                    slow_pct: 0,
                },
            );
        }

        self.queue_hit(
            id,
            target,
            raw,
            DamageType::Physical,
            opts,
            HitFlags {
                land_tick,
                source: DamageSource::Attack,
                ranged,
                reflectable: true,
                heal_attacker_pct: 0,
                on_hit,
            },
        );
    }

    /// Apply a status effect and record it.
    pub(crate) fn apply_status(&mut self, source: UnitId, target: UnitId, spec: StatusSpec) {
        let tick = self.tick;
        let Some(unit) = self.units.get_mut(target.index()) else {
            return;
        };
        if !unit.alive || spec.duration_ticks == 0 {
            return;
        }
        let duration = unit.statuses.apply(StatusEffect {
            kind: spec.kind,
            remaining: spec.duration_ticks,
            source,
            dps: spec.dps,
            slow_pct: spec.slow_pct.clamp(0, MAX_SLOW_PCT),
            last_pulse: tick,
        });
        self.emit(
            0,
            CombatEventKind::StatusApplied {
                source,
                target,
                status: spec.kind,
                duration,
            },
        );
    }

    fn alive_count(&self, side: Side) -> u32 {
        self.units
            .iter()
            .filter(|u| u.alive && u.side == side)
            .count() as u32
    }

    fn remaining_health(&self, side: Side) -> i64 {
        self.units
            .iter()
            .filter(|u| u.alive && u.side == side)
            .map(|u| i64::from(u.health.max(0)))
            .sum()
    }

    fn check_end(&mut self) {
        let home = self.alive_count(Side::Home);
        let away = self.alive_count(Side::Away);
        let wiped = home == 0 || away == 0;
        let timed_out = self.tick >= self.config.max_ticks;

        if !(wiped && self.pending.is_empty()) && !timed_out {
            return;
        }

        let health = [
            self.remaining_health(Side::Home),
            self.remaining_health(Side::Away),
        ];
        let winner = match (home, away) {
            (0, 0) => CombatWinner::Draw,
            (0, _) => CombatWinner::Away,
            (_, 0) => CombatWinner::Home,
            // Exact ties go to the host.
            _ if health[0] >= health[1] => CombatWinner::Home,
            _ => CombatWinner::Away,
        };
        let surviving = match winner {
            CombatWinner::Home => home,
            CombatWinner::Away => away,
            CombatWinner::Draw => 0,
        };
        let damage = if winner == CombatWinner::Draw {
            0
        } else {
            1 + surviving
        };

        self.pending.clear();
        self.emit(
            0,
            CombatEventKind::CombatEnd {
                winner,
                damage,
                duration_ticks: self.tick,
            },
        );
        self.state = SimState::Ended;
        tracing::debug!(
            tick = self.tick,
            ?winner,
            damage,
            events = self.events.len(),
            "Combat ended"
        );

        self.result = Some(CombatResult {
            winner,
            damage,
            duration_ticks: self.tick,
            surviving,
            remaining_health: health,
            loot: std::mem::take(&mut self.loot),
            events: std::mem::take(&mut self.events),
        });
    }

    /// Hash of the mutable combat state, for desync and determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.units.len().hash(&mut hasher);
        for unit in &self.units {
            unit.id.hash(&mut hasher);
            unit.alive.hash(&mut hasher);
            unit.position.hash(&mut hasher);
            unit.health.hash(&mut hasher);
            unit.mana.hash(&mut hasher);
            unit.shield.hash(&mut hasher);
            unit.target.hash(&mut hasher);
            unit.stats.hash(&mut hasher);
        }
        self.pending.len().hash(&mut hasher);
        for attack in &self.pending {
            attack.attacker.hash(&mut hasher);
            attack.target.hash(&mut hasher);
            attack.damage.hash(&mut hasher);
            attack.land_tick.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Landing parameters for [`CombatSimulator::queue_hit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HitFlags {
    pub land_tick: u32,
    pub source: DamageSource,
    pub ranged: bool,
    pub reflectable: bool,
    pub heal_attacker_pct: u32,
    pub on_hit: Option<StatusSpec>,
}

impl HitFlags {
    /// Damage-over-time pulse landing this tick.
    pub const fn damage_over_time(tick: u32) -> Self {
        Self {
            land_tick: tick,
            source: DamageSource::DamageOverTime,
            ranged: true,
            reflectable: false,
            heal_attacker_pct: 0,
            on_hit: None,
        }
    }

    /// Passive or ability hit landing at `land_tick`.
    pub const fn effect(land_tick: u32, source: DamageSource) -> Self {
        Self {
            land_tick,
            source,
            ranged: true,
            reflectable: false,
            heal_attacker_pct: 0,
            on_hit: None,
        }
    }
}

/// Stretch an interval by a slow percent.
fn slowed(ticks: u32, slow_pct: i32) -> u32 {
    let slow = slow_pct.clamp(0, MAX_SLOW_PCT) as u32;
    (ticks * 100 / (100 - slow)).max(1)
}

/// Add a team to the arena, moving units off invalid or shared cells.
fn place_team(units: &mut Vec<CombatUnit>, team: CombatTeam, side: Side) {
    let mut taken: HashSet<HexCoord> = HashSet::new();
    for mut spec in team.units {
        if !is_valid_deploy(spec.position) || taken.contains(&spec.position) {
            let free = (0..HALF_HEIGHT)
                .flat_map(|y| (0..BOARD_WIDTH).map(move |x| HexCoord::new(x, y)))
                .find(|c| !taken.contains(c));
            let Some(free) = free else {
                tracing::warn!(owner = %team.owner, template = %spec.template, "No free cell, unit dropped");
                continue;
            };
            tracing::warn!(
                owner = %team.owner,
                template = %spec.template,
                x = spec.position.x,
                y = spec.position.y,
                "Invalid or shared deploy cell, relocating"
            );
            spec.position = free;
        }
        taken.insert(spec.position);
        let id = UnitId(units.len() as u32);
        units.push(CombatUnit::from_spec(id, side, &team.owner, spec));
    }
}
