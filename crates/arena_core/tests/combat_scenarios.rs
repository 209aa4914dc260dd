//! Combat scenarios driven tick by tick.
//!
//! Units are laid out with the fixtures' local coordinates. Home units get
//! arena ids first, in roster order, then away units.

use arena_core::ability::{Ability, AbilityEffect, DamageSpec, TargetMode};
use arena_core::effects::{StatusEffect, StatusKind};
use arena_core::events::{CombatEvent, CombatEventKind, CombatWinner, DamageSource};
use arena_core::simulation::{CombatSimulator, SimConfig, SimState, MAX_COMBAT_TICKS};
use arena_core::stats::DamageType;
use arena_core::unit::UnitId;
use arena_test_utils::determinism::verify_simulation_determinism;
use arena_test_utils::fixtures::{simulator, skirmish, unit};

fn finish(sim: &mut CombatSimulator) -> Vec<CombatEvent> {
    while sim.state() != SimState::Ended {
        sim.step();
    }
    sim.result().map(|r| r.events.clone()).unwrap_or_default()
}

fn hits_from(events: &[CombatEvent], attacker: UnitId) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e.kind {
            CombatEventKind::DamageApplied {
                attacker: a,
                amount,
                source: DamageSource::Attack,
                ..
            } if a == attacker => Some(amount),
            _ => None,
        })
        .collect()
}

/// One striker next to a durable dummy; the striker's first attack is in
/// flight after the first tick.
fn striker_vs_dummy(range: i32) -> CombatSimulator {
    let striker = unit("striker").at(3, 0).attack(100).range(range).no_cast().build();
    let dummy = unit("dummy")
        .at(3, 0)
        .health(5000)
        .attack(1)
        .no_cast()
        .build();
    let mut sim = simulator(vec![striker], vec![dummy], 1);
    sim.step();
    sim.step();
    assert!(
        sim.pending().iter().any(|p| p.attacker == UnitId(0)),
        "striker attacked on tick 1"
    );
    sim
}

#[test]
fn test_melee_attack_cancelled_when_attacker_dies() {
    let mut sim = striker_vs_dummy(1);
    sim.unit_mut(UnitId(0)).expect("striker").kill(None);

    let events = finish(&mut sim);
    assert!(hits_from(&events, UnitId(0)).is_empty());
    assert_eq!(sim.result().map(|r| r.winner), Some(CombatWinner::Away));
}

#[test]
fn test_ranged_attack_lands_after_attacker_dies() {
    let mut sim = striker_vs_dummy(4);
    sim.unit_mut(UnitId(0)).expect("striker").kill(None);

    let events = finish(&mut sim);
    let hits = hits_from(&events, UnitId(0));
    assert_eq!(hits.len(), 1);
    assert!(hits[0] > 0);
}

#[test]
fn test_stuck_unit_switches_target() {
    // Board (0, 7) is walled in by three rooted allies.
    let hunter = unit("hunter").at(0, 3).no_cast().build();
    let walls = [(1, 3), (0, 2), (1, 2)].map(|(x, y)| unit("wall").at(x, y).no_cast().build());
    // Away local (6, 0) is board (0, 3); local (0, 0) is board (6, 3).
    let near = unit("near").at(6, 0).no_cast().build();
    let far = unit("far").at(0, 0).no_cast().build();

    let mut home = vec![hunter];
    home.extend(walls);
    let mut sim = simulator(home, vec![near, far], 4);
    for id in 1..=5 {
        sim.unit_mut(UnitId(id)).expect("unit").statuses.apply(StatusEffect {
            kind: StatusKind::Root,
            remaining: 10_000,
            source: UnitId(id),
            dps: 0,
            slow_pct: 0,
            last_pulse: 0,
        });
    }

    sim.step();
    sim.step();
    assert_eq!(sim.unit(UnitId(0)).and_then(|u| u.target), Some(UnitId(4)));

    for _ in 0..12 {
        sim.step();
    }
    let hunter = sim.unit(UnitId(0)).expect("hunter");
    assert_eq!(hunter.position, arena_core::hex::HexCoord::new(0, 7));
    assert_eq!(hunter.target, Some(UnitId(5)));
}

#[test]
fn test_stuck_unit_takes_enemy_in_range() {
    // Home local (3, 0) is board (3, 4), next to away local (3, 0) at board (3, 3).
    let hunter = unit("hunter").at(3, 0).attack(10).no_cast().build();
    let near = unit("near").at(3, 0).attack(0).health(10_000).no_cast().build();
    let far = unit("far").at(3, 3).attack(0).no_cast().build();
    let mut sim = simulator(vec![hunter], vec![near, far], 6);
    sim.step();

    let start = sim.unit(UnitId(0)).expect("hunter").position;
    let hunter = sim.unit_mut(UnitId(0)).expect("hunter");
    hunter.target = Some(UnitId(2));
    hunter.stuck_ticks = SimConfig::default().stuck_threshold;

    sim.step();
    let hunter = sim.unit(UnitId(0)).expect("hunter");
    assert_eq!(hunter.target, Some(UnitId(1)));
    assert_eq!(hunter.stuck_ticks, 0);
    assert_eq!(hunter.position, start);
    assert!(sim
        .pending()
        .iter()
        .any(|p| p.attacker == UnitId(0) && p.target == UnitId(1)));

    sim.step();
    assert_eq!(sim.unit(UnitId(0)).expect("hunter").position, start);
}

#[test]
fn test_zero_damage_ability_kills_one_health_unit() {
    let dud = Ability {
        name: "Dud".to_string(),
        effect: AbilityEffect::Damage {
            damage: DamageSpec {
                base: 0,
                attack_ratio: 0,
                damage_type: DamageType::Magic,
                targets: TargetMode::CurrentTarget,
            },
            status: None,
            mana_burn: None,
            armor_shred: None,
        },
    };
    let caster = unit("caster").at(3, 0).attack(0).mana(10, 10).ability(dud).build();
    let frail = unit("frail")
        .at(3, 0)
        .health(1)
        .attack(0)
        .resists(0, 0)
        .no_cast()
        .build();
    let result = simulator(vec![caster], vec![frail], 3).run();

    let hits: Vec<(u32, DamageSource)> = result
        .events
        .iter()
        .filter_map(|e| match e.kind {
            CombatEventKind::DamageApplied {
                target,
                amount,
                source,
                ..
            } if target == UnitId(1) => Some((amount, source)),
            _ => None,
        })
        .collect();
    assert_eq!(hits, vec![(1, DamageSource::Ability)]);

    let deaths = result
        .events
        .iter()
        .filter(|e| matches!(e.kind, CombatEventKind::Death { unit, .. } if unit == UnitId(1)))
        .count();
    assert_eq!(deaths, 1);
    assert_eq!(result.winner, CombatWinner::Home);
}

#[test]
fn test_minimum_damage_kills_fortress() {
    let pebble = unit("pebble").at(3, 0).attack(0).health(10_000).no_cast().build();
    let fortress = unit("fortress")
        .at(3, 0)
        .health(5)
        .attack(0)
        .resists(10_000, 10_000)
        .stats(|s| s.damage_reduction = 90)
        .no_cast()
        .build();
    let result = simulator(vec![pebble], vec![fortress], 2).run();
    assert_eq!(result.winner, CombatWinner::Home);
    assert!(result.duration_ticks < MAX_COMBAT_TICKS);
    assert!(hits_from(&result.events, UnitId(0)).iter().all(|&d| d == 1));
}

#[test]
fn test_same_seed_same_log() {
    let a = skirmish(17).run();
    let b = skirmish(17).run();
    assert_eq!(a, b);
    assert!(verify_simulation_determinism(|| skirmish(17), 300));
}

#[test]
fn test_event_ticks_are_ordered() {
    let result = skirmish(5).run();
    assert!(result.events.windows(2).all(|w| w[0].tick <= w[1].tick));
    assert!(matches!(
        result.events.first().map(|e| &e.kind),
        Some(CombatEventKind::CombatStart { .. })
    ));
    assert!(matches!(
        result.events.last().map(|e| &e.kind),
        Some(CombatEventKind::CombatEnd { .. })
    ));
}

#[test]
fn test_dead_units_die_once() {
    let result = skirmish(23).run();
    let mut dead: Vec<UnitId> = result
        .events
        .iter()
        .filter_map(|e| match e.kind {
            CombatEventKind::Death { unit, .. } => Some(unit),
            _ => None,
        })
        .collect();
    let total = dead.len();
    dead.sort_unstable();
    dead.dedup();
    let revives = result
        .events
        .iter()
        .filter(|e| matches!(e.kind, CombatEventKind::Revive { .. }))
        .count();
    assert_eq!(dead.len(), total);
    assert!(revives <= 6);
}
