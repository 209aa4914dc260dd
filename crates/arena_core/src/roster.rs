//! Player rosters: board, bench and star merging.
//!
//! Three copies of the same template at the same star merge into one copy a
//! star higher. Merging runs as an explicit fixed-point pass: each star level
//! is drained in ascending order, and a merge at star `s` only ever creates
//! units at star `s + 1`, so the pass finishes after at most [`MAX_STAR`]
//! levels without recursion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::hex::{is_valid_deploy, HexCoord};

/// Highest star level.
pub const MAX_STAR: u8 = 3;

/// Bench capacity.
pub const BENCH_SLOTS: usize = 9;

/// Copies consumed by one merge.
pub const MERGE_COPIES: usize = 3;

/// Items one unit can hold.
pub const MAX_ITEMS: usize = 3;

/// A unit owned by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterUnit {
    /// Stable id within the owner's roster.
    pub instance_id: u64,
    /// Template id.
    pub template: String,
    /// Star level, `1..=MAX_STAR`.
    pub star: u8,
    /// Equipped item ids.
    pub items: Vec<String>,
}

impl RosterUnit {
    /// A fresh one-star unit.
    #[must_use]
    pub fn new(instance_id: u64, template: impl Into<String>) -> Self {
        Self {
            instance_id,
            template: template.into(),
            star: 1,
            items: Vec::new(),
        }
    }

    /// One-star copies this unit represents.
    #[must_use]
    pub fn copies(&self) -> u32 {
        3u32.pow(u32::from(self.star.saturating_sub(1)))
    }
}

/// A unit placed on the board at a local position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardUnit {
    /// The unit.
    pub unit: RosterUnit,
    /// Local position, row 0 is the front.
    pub position: HexCoord,
}

/// Reference to a unit held by a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Bench slot index.
    Bench(usize),
    /// Local board position.
    Board(HexCoord),
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Bench(index) => write!(f, "bench slot {index}"),
            Slot::Board(pos) => write!(f, "board ({}, {})", pos.x, pos.y),
        }
    }
}

/// One completed merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merge {
    /// Template merged.
    pub template: String,
    /// Star after merging.
    pub star: u8,
    /// Instance id of the surviving unit.
    pub instance_id: u64,
}

/// Outcome of a merge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Merges performed, in order.
    pub merges: Vec<Merge>,
    /// Items that did not fit on the merged unit.
    pub returned_items: Vec<String>,
    /// Extra units that neither merged nor fit on the bench.
    pub leftover: Vec<RosterUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Board(usize),
    Bench(usize),
    Extra(usize),
}

/// Board plus bench.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    /// Units on the board.
    pub board: Vec<BoardUnit>,
    /// Bench slots.
    pub bench: Vec<Option<RosterUnit>>,
    next_instance: u64,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}

impl Roster {
    /// Empty roster with a full-size bench.
    #[must_use]
    pub fn new() -> Self {
        Self {
            board: Vec::new(),
            bench: vec![None; BENCH_SLOTS],
            next_instance: 1,
        }
    }

    /// Allocate an instance id.
    pub fn next_instance_id(&mut self) -> u64 {
        let id = self.next_instance;
        self.next_instance += 1;
        id
    }

    /// First empty bench slot.
    #[must_use]
    pub fn free_bench_slot(&self) -> Option<usize> {
        self.bench.iter().position(Option::is_none)
    }

    /// Units on the bench.
    pub fn bench_units(&self) -> impl Iterator<Item = &RosterUnit> {
        self.bench.iter().flatten()
    }

    /// Every owned unit, board first.
    pub fn units(&self) -> impl Iterator<Item = &RosterUnit> {
        self.board.iter().map(|b| &b.unit).chain(self.bench_units())
    }

    /// Put a unit on the first free bench slot.
    ///
    /// # Errors
    ///
    /// `BenchFull` if every slot is taken.
    pub fn add_to_bench(&mut self, unit: RosterUnit) -> Result<usize, ActionError> {
        let slot = self.free_bench_slot().ok_or(ActionError::BenchFull)?;
        self.bench[slot] = Some(unit);
        Ok(slot)
    }

    /// Board unit at a local position.
    #[must_use]
    pub fn board_unit(&self, pos: HexCoord) -> Option<&BoardUnit> {
        self.board.iter().find(|b| b.position == pos)
    }

    /// Mutable access to the unit in `slot`.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if the slot is empty.
    pub fn unit_mut(&mut self, slot: Slot) -> Result<&mut RosterUnit, ActionError> {
        let found = match slot {
            Slot::Bench(index) => self.bench.get_mut(index).and_then(Option::as_mut),
            Slot::Board(pos) => self
                .board
                .iter_mut()
                .find(|b| b.position == pos)
                .map(|b| &mut b.unit),
        };
        found.ok_or_else(|| ActionError::InvalidSlot(slot.to_string()))
    }

    /// Remove and return the unit in `slot`.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if the slot is empty.
    pub fn take(&mut self, slot: Slot) -> Result<RosterUnit, ActionError> {
        let taken = match slot {
            Slot::Bench(index) => self.bench.get_mut(index).and_then(Option::take),
            Slot::Board(pos) => self
                .board
                .iter()
                .position(|b| b.position == pos)
                .map(|i| self.board.remove(i).unit),
        };
        taken.ok_or_else(|| ActionError::InvalidSlot(slot.to_string()))
    }

    /// Move a bench unit onto the board. An occupied cell swaps its unit
    /// onto the vacated bench slot.
    ///
    /// # Errors
    ///
    /// `InvalidPosition` outside the deployment half, `InvalidSlot` for an
    /// empty bench slot, `BoardFull` when placing onto a free cell would
    /// exceed `board_limit`.
    pub fn place(
        &mut self,
        bench_slot: usize,
        pos: HexCoord,
        board_limit: usize,
    ) -> Result<(), ActionError> {
        if !is_valid_deploy(pos) {
            return Err(ActionError::InvalidPosition { x: pos.x, y: pos.y });
        }
        if self.bench.get(bench_slot).map_or(true, Option::is_none) {
            return Err(ActionError::InvalidSlot(Slot::Bench(bench_slot).to_string()));
        }

        let occupant = self.board.iter().position(|b| b.position == pos);
        if occupant.is_none() && self.board.len() >= board_limit {
            return Err(ActionError::BoardFull(board_limit));
        }
        let unit = self.take(Slot::Bench(bench_slot))?;
        if let Some(i) = occupant {
            let swapped = std::mem::replace(&mut self.board[i].unit, unit);
            self.bench[bench_slot] = Some(swapped);
        } else {
            self.board.push(BoardUnit {
                unit,
                position: pos,
            });
        }
        Ok(())
    }

    /// Move a board unit back to the bench.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if nothing stands at `pos`, `BenchFull` if there is no room.
    pub fn bench_unit(&mut self, pos: HexCoord) -> Result<usize, ActionError> {
        let slot = self.free_bench_slot().ok_or(ActionError::BenchFull)?;
        let unit = self.take(Slot::Board(pos))?;
        self.bench[slot] = Some(unit);
        Ok(slot)
    }

    /// Merge every eligible triple.
    pub fn merge_all(&mut self) -> MergeReport {
        self.absorb(Vec::new())
    }

    /// Merge with `extra` units counted as candidates, then bench whatever
    /// extras remain. Extras that fit nowhere come back in
    /// [`MergeReport::leftover`].
    pub fn absorb(&mut self, mut extra: Vec<RosterUnit>) -> MergeReport {
        let mut report = MergeReport::default();

        for star in 1..MAX_STAR {
            while let Some(group) = self.find_triple(star, &extra) {
                self.merge_group(&group, &mut extra, &mut report);
            }
        }

        for unit in extra {
            match self.free_bench_slot() {
                Some(slot) => self.bench[slot] = Some(unit),
                None => report.leftover.push(unit),
            }
        }
        report
    }

    fn unit_at<'a>(&'a self, extra: &'a [RosterUnit], loc: Location) -> Option<&'a RosterUnit> {
        match loc {
            Location::Board(i) => self.board.get(i).map(|b| &b.unit),
            Location::Bench(i) => self.bench.get(i).and_then(Option::as_ref),
            Location::Extra(i) => extra.get(i),
        }
    }

    /// The first three copies of the alphabetically first template with a
    /// full set at `star`, in board, bench, extra order.
    fn find_triple(&self, star: u8, extra: &[RosterUnit]) -> Option<Vec<Location>> {
        let locations = (0..self.board.len())
            .map(Location::Board)
            .chain((0..self.bench.len()).map(Location::Bench))
            .chain((0..extra.len()).map(Location::Extra));

        let mut groups: BTreeMap<&str, Vec<Location>> = BTreeMap::new();
        for loc in locations {
            if let Some(unit) = self.unit_at(extra, loc).filter(|u| u.star == star) {
                groups.entry(unit.template.as_str()).or_default().push(loc);
            }
        }
        groups
            .into_values()
            .find(|locs| locs.len() >= MERGE_COPIES)
            .map(|mut locs| {
                locs.truncate(MERGE_COPIES);
                locs
            })
    }

    fn merge_group(
        &mut self,
        group: &[Location],
        extra: &mut Vec<RosterUnit>,
        report: &mut MergeReport,
    ) {
        let (keeper, consumed) = group.split_at(1);

        let mut donated_items = Vec::new();
        // Remove from the back so earlier indices stay valid.
        let mut consumed = consumed.to_vec();
        consumed.sort_by_key(|loc| std::cmp::Reverse(location_key(*loc)));
        for loc in consumed {
            let unit = match loc {
                Location::Board(i) => Some(self.board.remove(i).unit),
                Location::Bench(i) => self.bench[i].take(),
                Location::Extra(i) => Some(extra.remove(i)),
            };
            if let Some(unit) = unit {
                donated_items.extend(unit.items);
            }
        }

        let unit = match keeper[0] {
            Location::Board(i) => &mut self.board[i].unit,
            Location::Bench(i) => match self.bench[i].as_mut() {
                Some(unit) => unit,
                None => return,
            },
            Location::Extra(i) => &mut extra[i],
        };
        unit.star += 1;
        for item in donated_items {
            if unit.items.len() < MAX_ITEMS {
                unit.items.push(item);
            } else {
                report.returned_items.push(item);
            }
        }
        tracing::debug!(template = %unit.template, star = unit.star, "Merged units");
        report.merges.push(Merge {
            template: unit.template.clone(),
            star: unit.star,
            instance_id: unit.instance_id,
        });
    }
}

/// Sort key keeping removal order stable across location kinds.
fn location_key(loc: Location) -> (u8, usize) {
    match loc {
        Location::Board(i) => (0, i),
        Location::Bench(i) => (1, i),
        Location::Extra(i) => (2, i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster_with(templates: &[&str]) -> Roster {
        let mut roster = Roster::new();
        for template in templates {
            let id = roster.next_instance_id();
            roster
                .add_to_bench(RosterUnit::new(id, *template))
                .expect("bench has room");
        }
        roster
    }

    #[test]
    fn test_three_copies_merge() {
        let mut roster = roster_with(&["knight", "archer", "knight", "knight"]);
        let report = roster.merge_all();
        assert_eq!(report.merges.len(), 1);
        assert_eq!(report.merges[0].star, 2);
        let knights: Vec<_> = roster.units().filter(|u| u.template == "knight").collect();
        assert_eq!(knights.len(), 1);
        assert_eq!(knights[0].star, 2);
        assert_eq!(knights[0].instance_id, 1);
    }

    #[test]
    fn test_merge_chains_to_next_star() {
        let mut roster = roster_with(&["knight"; 9]);
        let report = roster.merge_all();
        assert_eq!(report.merges.len(), 4);
        let units: Vec<_> = roster.units().collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].star, 3);
    }

    #[test]
    fn test_max_star_never_merges() {
        let mut roster = Roster::new();
        for _ in 0..3 {
            let id = roster.next_instance_id();
            let mut unit = RosterUnit::new(id, "knight");
            unit.star = MAX_STAR;
            roster.add_to_bench(unit).expect("room");
        }
        assert!(roster.merge_all().merges.is_empty());
    }

    #[test]
    fn test_board_unit_is_kept_and_items_overflow() {
        let mut roster = roster_with(&["knight", "knight", "knight"]);
        roster.place(0, HexCoord::new(3, 0), 1).expect("valid place");
        roster.board[0].unit.items = vec!["a".into(), "b".into()];
        roster.bench[1].as_mut().expect("unit").items = vec!["c".into(), "d".into()];

        let report = roster.merge_all();
        assert_eq!(roster.board.len(), 1);
        assert_eq!(roster.board[0].unit.star, 2);
        assert_eq!(roster.board[0].unit.items, vec!["a", "b", "c"]);
        assert_eq!(report.returned_items, vec!["d".to_string()]);
        assert_eq!(roster.bench_units().count(), 0);
    }

    #[test]
    fn test_absorb_deferred_units() {
        let mut roster = roster_with(&["knight"; 9]);
        // 9 knights merge into a 3-star, then the deferred pair fills the bench.
        let extra = vec![RosterUnit::new(100, "archer"), RosterUnit::new(101, "archer")];
        let report = roster.absorb(extra);
        assert!(report.leftover.is_empty());
        assert_eq!(roster.bench_units().filter(|u| u.template == "archer").count(), 2);
    }

    #[test]
    fn test_absorb_reports_leftover_when_bench_full() {
        let names = ["a", "b", "c", "d", "e", "f", "g", "h", "i"];
        let mut roster = roster_with(&names);
        let report = roster.absorb(vec![RosterUnit::new(50, "z")]);
        assert_eq!(report.leftover.len(), 1);
    }

    #[test]
    fn test_place_swaps_and_limits() {
        let mut roster = roster_with(&["knight", "archer", "mage"]);
        roster.place(0, HexCoord::new(0, 0), 1).expect("place");
        assert_eq!(
            roster.place(1, HexCoord::new(1, 0), 1),
            Err(ActionError::BoardFull(1))
        );
        roster.place(1, HexCoord::new(0, 0), 1).expect("swap");
        assert_eq!(roster.board[0].unit.template, "archer");
        assert_eq!(roster.bench[1].as_ref().map(|u| u.template.as_str()), Some("knight"));
        assert_eq!(
            roster.place(2, HexCoord::new(0, 4), 5),
            Err(ActionError::InvalidPosition { x: 0, y: 4 })
        );
        assert!(matches!(
            roster.place(7, HexCoord::new(2, 0), 5),
            Err(ActionError::InvalidSlot(_))
        ));
    }

    #[test]
    fn test_bench_unit_round_trip() {
        let mut roster = roster_with(&["knight"]);
        roster.place(0, HexCoord::new(2, 1), 3).expect("place");
        let slot = roster.bench_unit(HexCoord::new(2, 1)).expect("bench");
        assert_eq!(slot, 0);
        assert!(roster.board.is_empty());
        assert!(roster.bench_unit(HexCoord::new(2, 1)).is_err());
    }
}
