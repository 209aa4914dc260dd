//! Fixed-point math utilities for deterministic simulation.
//!
//! Damage, healing and pathfinding costs use fixed-point arithmetic so
//! that two servers replaying the same combat produce bit-identical logs.
//! Floating-point operations can produce different results on different CPUs.

use fixed::types::I32F32;

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Convert a whole percentage into a fraction (`25` → `0.25`).
#[must_use]
pub fn percent(value: i32) -> Fixed {
    Fixed::from_num(value) / Fixed::from_num(100)
}

/// Multiply `value` by `(1 + pct/100)`.
#[must_use]
pub fn amplify(value: Fixed, pct: i32) -> Fixed {
    value * (Fixed::ONE + percent(pct))
}

/// Integer `value * pct / 100`, rounded down, never negative.
#[must_use]
pub fn scale_pct(value: u32, pct: i32) -> u32 {
    let scaled = (i64::from(value) * i64::from(pct)) / 100;
    scaled.clamp(0, i64::from(u32::MAX)) as u32
}

/// Floor a fixed-point value to a non-negative integer.
#[must_use]
pub fn floor_u32(value: Fixed) -> u32 {
    let whole: i64 = value.floor().to_num();
    whole.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_conversion() {
        assert_eq!(percent(100), Fixed::ONE);
        assert_eq!(percent(50), Fixed::from_num(1) / Fixed::from_num(2));
        assert_eq!(percent(0), Fixed::ZERO);
    }

    #[test]
    fn test_amplify() {
        let base = Fixed::from_num(200);
        assert_eq!(amplify(base, 50), Fixed::from_num(300));
        assert_eq!(amplify(base, -50), Fixed::from_num(100));
    }

    #[test]
    fn test_scale_pct_floors_and_clamps() {
        assert_eq!(scale_pct(99, 50), 49);
        assert_eq!(scale_pct(10, -20), 0);
    }

    #[test]
    fn test_floor_u32() {
        assert_eq!(floor_u32(Fixed::from_num(3.99)), 3);
        assert_eq!(floor_u32(Fixed::from_num(-2)), 0);
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
    }
}
