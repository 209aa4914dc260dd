//! Hex board geometry.
//!
//! The combat board is 7 columns by 8 rows in "odd-r" offset layout (odd
//! rows are shoved half a cell to the right). Each side deploys into its own
//! 7x4 half. Offset coordinates are what clients and rosters store; cube
//! coordinates are used internally because distance becomes a simple formula.

use serde::{Deserialize, Serialize};

/// Board width in cells.
pub const BOARD_WIDTH: i32 = 7;

/// Board height in cells.
pub const BOARD_HEIGHT: i32 = 8;

/// Rows owned by each side.
pub const HALF_HEIGHT: i32 = BOARD_HEIGHT / 2;

/// Cube direction offsets `(dq, dr)`, clockwise from east.
const CUBE_DIRECTIONS: [(i32, i32); 6] = [(1, 0), (1, -1), (0, -1), (-1, 0), (-1, 1), (0, 1)];

/// Scaled cartesian x step per half column (sqrt(3)/2 * 1000).
const CART_X_UNIT: i64 = 866;

/// Scaled cartesian y step per row (3/2 * 1000).
const CART_Y_UNIT: i64 = 1500;

/// Distance between two adjacent cell centers in scaled cartesian units.
pub const CART_CELL_SPACING: i64 = 2 * CART_X_UNIT;

/// A cell on the board in odd-r offset form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HexCoord {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

/// Cube coordinates `(q, r, s)` with `q + r + s == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CubeCoord {
    /// Column axis.
    pub q: i32,
    /// Row axis.
    pub r: i32,
    /// Derived axis.
    pub s: i32,
}

impl CubeCoord {
    /// Build a cube coordinate from its two free axes.
    #[must_use]
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r, s: -q - r }
    }

    /// Convert back to offset form.
    #[must_use]
    pub fn to_offset(self) -> HexCoord {
        let x = self.q + (self.r - (self.r & 1)).div_euclid(2);
        HexCoord::new(x, self.r)
    }
}

impl HexCoord {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Convert to cube coordinates.
    #[must_use]
    pub fn to_cube(self) -> CubeCoord {
        let q = self.x - (self.y - (self.y & 1)).div_euclid(2);
        CubeCoord::new(q, self.y)
    }

    /// Hex distance to another cell.
    #[must_use]
    pub fn distance(self, other: Self) -> u32 {
        distance(self, other)
    }

    /// Whether the cell lies on the board.
    #[must_use]
    pub const fn in_bounds(self) -> bool {
        in_bounds(self)
    }

    /// In-bounds neighbors, in a fixed clockwise order starting east.
    #[must_use]
    pub fn neighbors(self) -> Vec<HexCoord> {
        neighbors(self)
    }

    /// Column offset from another cell, used as a horizontal tie-breaker.
    #[must_use]
    pub fn horizontal_offset(self, other: Self) -> u32 {
        self.x.abs_diff(other.x)
    }

    /// Cell center projected to scaled integer cartesian space.
    ///
    /// Adjacent centers are [`CART_CELL_SPACING`] apart.
    #[must_use]
    pub fn to_cartesian(self) -> (i64, i64) {
        let cube = self.to_cube();
        (
            (2 * i64::from(cube.q) + i64::from(cube.r)) * CART_X_UNIT,
            i64::from(cube.r) * CART_Y_UNIT,
        )
    }

    /// Row-major index of an in-bounds cell.
    #[must_use]
    pub const fn index(self) -> usize {
        (self.y * BOARD_WIDTH + self.x) as usize
    }
}

/// Hex distance between two cells: `(|dq| + |dr| + |ds|) / 2`.
#[must_use]
pub fn distance(a: HexCoord, b: HexCoord) -> u32 {
    let ca = a.to_cube();
    let cb = b.to_cube();
    (ca.q.abs_diff(cb.q) + ca.r.abs_diff(cb.r) + ca.s.abs_diff(cb.s)) / 2
}

/// Whether a cell lies on the board.
#[must_use]
pub const fn in_bounds(pos: HexCoord) -> bool {
    pos.x >= 0 && pos.x < BOARD_WIDTH && pos.y >= 0 && pos.y < BOARD_HEIGHT
}

/// In-bounds neighbors of a cell. Parity of the row decides the offsets.
#[must_use]
pub fn neighbors(pos: HexCoord) -> Vec<HexCoord> {
    let cube = pos.to_cube();
    CUBE_DIRECTIONS
        .iter()
        .map(|&(dq, dr)| CubeCoord::new(cube.q + dq, cube.r + dr).to_offset())
        .filter(|c| c.in_bounds())
        .collect()
}

/// Iterate every cell on the board in row-major order.
pub fn all_cells() -> impl Iterator<Item = HexCoord> {
    (0..BOARD_HEIGHT).flat_map(|y| (0..BOARD_WIDTH).map(move |x| HexCoord::new(x, y)))
}

/// Which half of the board a team fights from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// The host: rows 4..=7, front row 4.
    Home,
    /// The visitor: rows 0..=3, front row 3.
    Away,
}

impl Side {
    /// The opposing side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Side::Home => Side::Away,
            Side::Away => Side::Home,
        }
    }

    /// Array index for per-side bookkeeping.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Side::Home => 0,
            Side::Away => 1,
        }
    }

    /// Map a roster position (local half, row 0 = front) onto the board.
    ///
    /// The away side is point-mirrored so both teams face each other.
    #[must_use]
    pub const fn to_board(self, local: HexCoord) -> HexCoord {
        match self {
            Side::Home => HexCoord::new(local.x, HALF_HEIGHT + local.y),
            Side::Away => HexCoord::new(BOARD_WIDTH - 1 - local.x, HALF_HEIGHT - 1 - local.y),
        }
    }

    /// How many rows `pos` lies from this side's back edge.
    ///
    /// The larger the value, the deeper into the opponent's half.
    #[must_use]
    pub const fn depth(self, pos: HexCoord) -> i32 {
        match self {
            Side::Home => BOARD_HEIGHT - 1 - pos.y,
            Side::Away => pos.y,
        }
    }
}

/// Whether a local roster position is inside a deployment half.
#[must_use]
pub const fn is_valid_deploy(local: HexCoord) -> bool {
    local.x >= 0 && local.x < BOARD_WIDTH && local.y >= 0 && local.y < HALF_HEIGHT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_round_trip_on_board() {
        for cell in all_cells() {
            let cube = cell.to_cube();
            assert_eq!(cube.q + cube.r + cube.s, 0);
            assert_eq!(cube.to_offset(), cell);
        }
    }

    #[test]
    fn test_cube_formula() {
        // q = x - floor((y - (y & 1)) / 2)
        assert_eq!(HexCoord::new(3, 4).to_cube(), CubeCoord::new(1, 4));
        assert_eq!(HexCoord::new(3, 5).to_cube(), CubeCoord::new(1, 5));
        assert_eq!(HexCoord::new(0, 7).to_cube(), CubeCoord::new(-3, 7));
    }

    #[test]
    fn test_distance() {
        let a = HexCoord::new(0, 0);
        assert_eq!(distance(a, a), 0);
        assert_eq!(distance(a, HexCoord::new(1, 0)), 1);
        assert_eq!(distance(a, HexCoord::new(0, 1)), 1);
        assert_eq!(distance(a, HexCoord::new(6, 7)), 10);
        assert_eq!(distance(HexCoord::new(3, 3), HexCoord::new(3, 4)), 1);
    }

    #[test]
    fn test_distance_is_symmetric() {
        for a in all_cells() {
            for b in all_cells() {
                assert_eq!(distance(a, b), distance(b, a));
            }
        }
    }

    #[test]
    fn test_neighbors_parity() {
        // Even row: diagonals lean left.
        let even = HexCoord::new(3, 2);
        let mut got = neighbors(even);
        got.sort();
        let mut expected = vec![
            HexCoord::new(2, 1),
            HexCoord::new(3, 1),
            HexCoord::new(2, 2),
            HexCoord::new(4, 2),
            HexCoord::new(2, 3),
            HexCoord::new(3, 3),
        ];
        expected.sort();
        assert_eq!(got, expected);

        // Odd row: diagonals lean right.
        let odd = HexCoord::new(3, 3);
        let mut got = neighbors(odd);
        got.sort();
        let mut expected = vec![
            HexCoord::new(3, 2),
            HexCoord::new(4, 2),
            HexCoord::new(2, 3),
            HexCoord::new(4, 3),
            HexCoord::new(3, 4),
            HexCoord::new(4, 4),
        ];
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_neighbors_are_adjacent_and_in_bounds() {
        for cell in all_cells() {
            for n in neighbors(cell) {
                assert!(n.in_bounds());
                assert_eq!(distance(cell, n), 1);
            }
        }
        assert_eq!(neighbors(HexCoord::new(0, 0)).len(), 2);
    }

    #[test]
    fn test_side_mapping_mirrors() {
        let front_left = HexCoord::new(0, 0);
        assert_eq!(Side::Home.to_board(front_left), HexCoord::new(0, 4));
        assert_eq!(Side::Away.to_board(front_left), HexCoord::new(6, 3));
        assert_eq!(Side::Away.to_board(HexCoord::new(2, 3)), HexCoord::new(4, 0));
        assert!(is_valid_deploy(HexCoord::new(6, 3)));
        assert!(!is_valid_deploy(HexCoord::new(6, 4)));
    }

    #[test]
    fn test_adjacent_cartesian_spacing() {
        let (ax, ay) = HexCoord::new(3, 3).to_cartesian();
        for n in neighbors(HexCoord::new(3, 3)) {
            let (bx, by) = n.to_cartesian();
            let d2 = (ax - bx).pow(2) + (ay - by).pow(2);
            let expected = CART_CELL_SPACING.pow(2);
            // 866/1500 rounding keeps diagonals within half a percent
            assert!((d2 - expected).abs() * 200 < expected, "{n:?}: {d2}");
        }
    }
}
