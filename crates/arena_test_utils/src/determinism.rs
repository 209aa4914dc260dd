//! Replay checks for combats and rooms.
//!
//! Clients animate the event log the server sends them and never compute
//! outcomes, so the only thing that matters is that the same inputs always
//! give the same log. The engine guarantees this by using [`Fixed`] math,
//! seeded `ChaCha8Rng`s, id-ordered iteration, and by folding rayon results
//! back in matchup order. The helpers here build the same thing twice (or
//! more) and compare.
//!
//! [`Fixed`]: arena_core::math::Fixed

use std::thread;

use arena_core::room::{Phase, Room, RoomEvent};
use arena_core::simulation::{CombatSimulator, SimState};

use crate::fixtures::play_round;

/// Final hashes of several identical runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashTrace {
    /// One hash per run, in run order.
    pub hashes: Vec<u64>,
    /// Steps taken by each run.
    pub steps: u64,
}

impl HashTrace {
    /// Every run ended in the same state.
    #[must_use]
    pub fn agrees(&self) -> bool {
        self.hashes.windows(2).all(|pair| pair[0] == pair[1])
    }

    /// Distinct final hashes, sorted.
    #[must_use]
    pub fn distinct(&self) -> Vec<u64> {
        let mut distinct = self.hashes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        distinct
    }

    /// # Panics
    ///
    /// Panics with every hash when the runs disagree.
    pub fn assert_agrees(&self) {
        assert!(
            self.agrees(),
            "{} runs of {} steps ended in {} different states: {:?}",
            self.hashes.len(),
            self.steps,
            self.distinct().len(),
            self.hashes
        );
    }
}

/// Build `runs` fresh states, advance each `steps` times and hash the result.
///
/// ```
/// use arena_test_utils::determinism::replay_hashes;
/// use arena_test_utils::fixtures::skirmish;
///
/// replay_hashes(3, 200, || skirmish(7), |sim| sim.step(), |sim| sim.state_hash())
///     .assert_agrees();
/// ```
pub fn replay_hashes<S>(
    runs: usize,
    steps: u64,
    build: impl Fn() -> S,
    advance: impl Fn(&mut S),
    hash: impl Fn(&S) -> u64,
) -> HashTrace {
    let hashes = (0..runs)
        .map(|_| {
            let mut state = build();
            (0..steps).for_each(|_| advance(&mut state));
            hash(&state)
        })
        .collect();
    HashTrace { hashes, steps }
}

/// Two runs of a combat agree after `steps` ticks.
pub fn verify_simulation_determinism(build: impl Fn() -> CombatSimulator, steps: u64) -> bool {
    replay_hashes(2, steps, build, CombatSimulator::step, CombatSimulator::state_hash).agrees()
}

/// Final hashes of `count` combats run to the end on separate threads.
///
/// # Panics
///
/// Re-raises a panic from any worker.
pub fn run_parallel_simulations(
    build: impl Fn() -> CombatSimulator + Sync,
    count: usize,
) -> Vec<u64> {
    let build = &build;
    thread::scope(|scope| {
        let workers: Vec<_> = (0..count)
            .map(|_| {
                scope.spawn(move || {
                    let mut sim = build();
                    while sim.state() != SimState::Ended {
                        sim.step();
                    }
                    sim.state_hash()
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| match worker.join() {
                Ok(hash) => hash,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

/// Step two copies of a combat side by side and report the first tick
/// whose state hashes differ.
pub fn first_divergent_tick(build: impl Fn() -> CombatSimulator, max_steps: u64) -> Option<u32> {
    let (mut left, mut right) = (build(), build());
    for _ in 0..max_steps {
        left.step();
        right.step();
        if left.state_hash() != right.state_hash() {
            let tick = left.tick();
            tracing::warn!(tick, "Combat copies diverged");
            return Some(tick);
        }
        if left.state() == SimState::Ended && right.state() == SimState::Ended {
            break;
        }
    }
    None
}

/// Start two identical rooms, play up to `rounds` rounds with everyone
/// readying at once, and compare the notifications and final player state.
///
/// # Panics
///
/// Panics if the room cannot start.
pub fn verify_room_determinism(build: impl Fn() -> Room, rounds: u32) -> bool {
    let play = || {
        let mut room = build();
        room.start_game().expect("room starts");
        let mut log: Vec<RoomEvent> = room.drain_events();
        for _ in 0..rounds {
            if room.phase() != Phase::Planning {
                break;
            }
            log.extend(play_round(&mut room));
        }
        let players: Vec<_> = room.players().cloned().collect();
        (log, players)
    };
    play() == play()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{melee, ranged, room, simulator, skirmish};

    #[test]
    fn test_counter_replays() {
        let trace = replay_hashes(3, 10, || 0u64, |n| *n += 1, |n| *n);
        trace.assert_agrees();
        assert_eq!(trace.distinct(), vec![10]);
    }

    #[test]
    #[should_panic(expected = "different states")]
    fn test_disagreement_panics() {
        HashTrace {
            hashes: vec![1, 2],
            steps: 5,
        }
        .assert_agrees();
    }

    #[test]
    fn test_skirmish_replays() {
        assert!(verify_simulation_determinism(|| skirmish(11), 400));
    }

    #[test]
    fn test_copies_never_diverge() {
        let build = || simulator(vec![melee(3, 0), ranged(2, 3)], vec![melee(3, 0)], 5);
        assert_eq!(first_divergent_tick(build, 300), None);
    }

    #[test]
    fn test_threads_agree() {
        let hashes = run_parallel_simulations(|| skirmish(3), 4);
        assert_eq!(hashes.len(), 4);
        assert!(hashes.iter().all(|&h| h == hashes[0]));
    }

    #[test]
    fn test_rooms_replay() {
        assert!(verify_room_determinism(|| room(3, 21), 3));
    }
}
