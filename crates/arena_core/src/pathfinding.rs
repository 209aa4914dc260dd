//! A* pathfinding over the combat board.
//!
//! The board changes every tick, so no path is cached: callers ask for the
//! single next cell and re-run the search on the following tick. All costs use
//! fixed-point math so that tie-breaking is identical on every machine.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::hex::HexCoord;
use crate::math::Fixed;

/// Weight of the horizontal tie-break term (1/1024 per column of drift).
const DRIFT_WEIGHT: Fixed = Fixed::from_bits(1 << 22);

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    pos: HexCoord,
    /// f_score = steps + heuristic (lower is better)
    f_score: Fixed,
    /// Tie-breaker for determinism: lower row, then lower column first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so we reverse the comparison for min-heap behavior.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn coords_to_tie_breaker(pos: HexCoord) -> u64 {
    ((pos.y as u64) << 32) | (pos.x as u64)
}

/// Hex distance to the target plus a small penalty for column drift.
#[inline]
fn heuristic(pos: HexCoord, target: HexCoord) -> Fixed {
    Fixed::from_num(pos.distance(target))
        + DRIFT_WEIGHT * Fixed::from_num(pos.horizontal_offset(target))
}

/// Next cell to step into on the way to attack `target` from within `range`.
///
/// Returns `None` when `start` is already within range, or when every path
/// is blocked. `is_blocked` should report occupied cells; the target's own
/// cell is only used as the range anchor and is never entered.
pub fn next_step(
    start: HexCoord,
    range: u32,
    target: HexCoord,
    is_blocked: impl Fn(HexCoord) -> bool,
) -> Option<HexCoord> {
    let range = range.max(1);
    if start.distance(target) <= range {
        return None;
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<HexCoord, HexCoord> = HashMap::new();
    let mut g_score: HashMap<HexCoord, u32> = HashMap::new();

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        pos: start,
        f_score: heuristic(start, target),
        tie_breaker: coords_to_tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if current.pos != start && current.pos.distance(target) <= range {
            return first_step(&came_from, start, current.pos);
        }

        let current_g = g_score.get(&current.pos).copied().unwrap_or(u32::MAX);

        for neighbor in current.pos.neighbors() {
            if neighbor == target || is_blocked(neighbor) {
                continue;
            }

            let tentative_g = current_g + 1;
            let neighbor_g = g_score.get(&neighbor).copied().unwrap_or(u32::MAX);
            if tentative_g < neighbor_g {
                came_from.insert(neighbor, current.pos);
                g_score.insert(neighbor, tentative_g);
                open_set.push(AStarNode {
                    pos: neighbor,
                    f_score: Fixed::from_num(tentative_g) + heuristic(neighbor, target),
                    tie_breaker: coords_to_tie_breaker(neighbor),
                });
            }
        }
    }

    None
}

/// Walk `came_from` back from `goal` to the cell adjacent to `start`.
fn first_step(
    came_from: &HashMap<HexCoord, HexCoord>,
    start: HexCoord,
    goal: HexCoord,
) -> Option<HexCoord> {
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        if prev == start {
            return Some(current);
        }
        current = prev;
    }
    None
}
