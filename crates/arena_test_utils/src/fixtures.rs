//! Test fixtures and helpers.
//!
//! Builders for combat units and teams, plus ready-made rooms backed by
//! the built-in catalog.

use std::sync::Arc;

use arena_core::ability::Ability;
use arena_core::catalog::Catalog;
use arena_core::hex::HexCoord;
use arena_core::math::Fixed;
use arena_core::passives::UnitPassives;
use arena_core::room::{Phase, PlayerAction, Room, RoomConfig, RoomEvent, TimerKind, TimerRequest};
use arena_core::shop::{BasicEconomy, EconomyConfig};
use arena_core::simulation::{CombatSimulator, CombatTeam, MatchVariables, SimConfig};
use arena_core::stats::UnitStats;
use arena_core::unit::{LootTag, UnitSpec};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Builder for a [`UnitSpec`].
///
/// Defaults to a one-star unit with default stats, no crits and no ability.
#[derive(Debug, Clone)]
pub struct UnitBuilder {
    spec: UnitSpec,
}

impl UnitBuilder {
    /// Start a unit of `template` at local `(0, 0)`.
    #[must_use]
    pub fn new(template: &str) -> Self {
        let stats = UnitStats {
            crit_chance: 0,
            ..UnitStats::default()
        };
        Self {
            spec: UnitSpec {
                instance_id: 0,
                template: template.to_string(),
                star: 1,
                position: HexCoord::new(0, 0),
                stats,
                ability: None,
                passives: UnitPassives::default(),
                traits: Vec::new(),
                loot: Vec::new(),
            },
        }
    }

    /// Local position.
    #[must_use]
    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.spec.position = HexCoord::new(x, y);
        self
    }

    /// Edit stats in place.
    #[must_use]
    pub fn stats(mut self, edit: impl FnOnce(&mut UnitStats)) -> Self {
        edit(&mut self.spec.stats);
        self
    }

    /// Max health.
    #[must_use]
    pub fn health(self, health: i32) -> Self {
        self.stats(|s| s.max_health = health)
    }

    /// Attack damage.
    #[must_use]
    pub fn attack(self, attack: i32) -> Self {
        self.stats(|s| s.attack = attack)
    }

    /// Attack range in hexes.
    #[must_use]
    pub fn range(self, range: i32) -> Self {
        self.stats(|s| s.range = range)
    }

    /// Armor and magic resist.
    #[must_use]
    pub fn resists(self, armor: i32, magic_resist: i32) -> Self {
        self.stats(|s| {
            s.armor = armor;
            s.magic_resist = magic_resist;
        })
    }

    /// Mana pool; a huge pool effectively disables casting.
    #[must_use]
    pub fn mana(self, max: i32, starting: i32) -> Self {
        self.stats(|s| {
            s.max_mana = max;
            s.starting_mana = starting;
        })
    }

    /// Never cast within a normal combat.
    #[must_use]
    pub fn no_cast(self) -> Self {
        self.mana(1_000_000, 0)
    }

    /// Ability.
    #[must_use]
    pub fn ability(mut self, ability: Ability) -> Self {
        self.spec.ability = Some(ability);
        self
    }

    /// Passives.
    #[must_use]
    pub fn passives(mut self, passives: UnitPassives) -> Self {
        self.spec.passives = passives;
        self
    }

    /// Trait tag.
    #[must_use]
    pub fn with_trait(mut self, tag: &str) -> Self {
        self.spec.traits.push(tag.to_string());
        self
    }

    /// Loot dropped on death.
    #[must_use]
    pub fn loot(mut self, tag: LootTag) -> Self {
        self.spec.loot.push(tag);
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> UnitSpec {
        self.spec
    }
}

/// Shorthand for [`UnitBuilder::new`].
#[must_use]
pub fn unit(template: &str) -> UnitBuilder {
    UnitBuilder::new(template)
}

/// A plain melee unit at a local position.
#[must_use]
pub fn melee(x: i32, y: i32) -> UnitSpec {
    unit("melee").at(x, y).build()
}

/// A plain ranged unit (range 4) at a local position.
#[must_use]
pub fn ranged(x: i32, y: i32) -> UnitSpec {
    unit("ranged").at(x, y).range(4).build()
}

/// A team with sequential instance ids.
#[must_use]
pub fn team(owner: &str, units: Vec<UnitSpec>) -> CombatTeam {
    let units = units
        .into_iter()
        .enumerate()
        .map(|(i, mut spec)| {
            spec.instance_id = i as u64 + 1;
            spec
        })
        .collect();
    CombatTeam::new(owner, units)
}

/// Simulator with default config and no match variables.
#[must_use]
pub fn simulator(home: Vec<UnitSpec>, away: Vec<UnitSpec>, seed: u64) -> CombatSimulator {
    CombatSimulator::new(
        team("home", home),
        team("away", away),
        MatchVariables::default(),
        SimConfig::default(),
        seed,
    )
}

/// A mixed three-versus-three fight with abilities from the catalog.
#[must_use]
pub fn skirmish(seed: u64) -> CombatSimulator {
    let catalog = builtin_catalog();
    let pick = |template: &str, x: i32, y: i32| {
        let data = catalog.unit(template);
        let mut builder = unit(template).at(x, y);
        if let Some(data) = data {
            builder = builder.stats(|s| *s = data.stats);
            if let Some(ability) = data.ability.clone() {
                builder = builder.ability(ability);
            }
            builder = builder.passives(data.passives.clone());
        }
        builder.build()
    };
    simulator(
        vec![
            pick("knight", 2, 0),
            pick("archer", 3, 2),
            pick("pyromancer", 4, 3),
        ],
        vec![
            pick("brute", 3, 0),
            pick("duelist", 4, 0),
            pick("cleric", 3, 3),
        ],
        seed,
    )
}

/// The built-in catalog.
///
/// # Panics
///
/// Panics if the bundled catalog fails to load.
#[must_use]
pub fn builtin_catalog() -> Arc<Catalog> {
    Arc::new(Catalog::builtin().expect("built-in catalog is valid"))
}

/// A room backed by the built-in catalog with players `p0..pN` joined.
///
/// # Panics
///
/// Panics if `players` exceeds the room capacity.
#[must_use]
pub fn room(players: usize, seed: u64) -> Room {
    room_with_config(players, seed, RoomConfig::default())
}

/// Like [`room`] with a custom config.
///
/// # Panics
///
/// Panics if `players` exceeds the room capacity.
#[must_use]
pub fn room_with_config(players: usize, seed: u64, config: RoomConfig) -> Room {
    let catalog = builtin_catalog();
    let economy = Arc::new(BasicEconomy::new(
        Arc::clone(&catalog),
        EconomyConfig::default(),
    ));
    let mut room = Room::new("test-room", config, catalog, economy, seed);
    for i in 0..players {
        room.add_player(format!("p{i}"), format!("Player {i}"))
            .expect("room has space");
    }
    room
}

/// Timer requests in an event batch.
#[must_use]
pub fn timer_requests(events: &[RoomEvent]) -> Vec<TimerRequest> {
    events
        .iter()
        .filter_map(|event| match event {
            RoomEvent::TimerRequested(request) => Some(*request),
            _ => None,
        })
        .collect()
}

/// Drive a room from planning through one full round by readying every
/// active player and firing the combat and results timers.
///
/// Returns every event emitted along the way.
///
/// # Panics
///
/// Panics if the room is not in planning.
pub fn play_round(room: &mut Room) -> Vec<RoomEvent> {
    assert_eq!(room.phase(), Phase::Planning, "round must start in planning");
    let mut events = room.drain_events();
    for id in room.active_ids() {
        room.handle_action(&id, PlayerAction::Ready)
            .expect("ready is legal in planning");
    }
    for kind in [TimerKind::Combat, TimerKind::Results] {
        events.extend(room.drain_events());
        let Some(request) = timer_requests(&events).into_iter().rev().find(|t| t.kind == kind)
        else {
            break;
        };
        room.on_timer(request.generation, kind);
    }
    events.extend(room.drain_events());
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let spec = unit("x").at(2, 3).health(900).attack(70).range(3).build();
        assert_eq!(spec.position, HexCoord::new(2, 3));
        assert_eq!(spec.stats.max_health, 900);
        assert_eq!(spec.stats.attack, 70);
        assert_eq!(spec.stats.range, 3);
        assert_eq!(spec.stats.crit_chance, 0);
    }

    #[test]
    fn test_team_assigns_ids() {
        let team = team("t", vec![melee(0, 0), ranged(1, 1)]);
        let ids: Vec<u64> = team.units.iter().map(|u| u.instance_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_play_round_advances() {
        let mut room = room(2, 9);
        room.start_game().expect("two players");
        play_round(&mut room);
        assert_eq!(room.round(), 2);
        assert_eq!(room.phase(), Phase::Planning);
    }
}
