//! Proptest strategies for combat inputs.

use arena_core::hex::{HexCoord, BOARD_WIDTH, HALF_HEIGHT};
use arena_core::stats::{DamageType, Element, UnitStats};
use arena_core::unit::UnitSpec;
use proptest::prelude::*;

use crate::fixtures::unit;

/// Any element.
pub fn arb_element() -> impl Strategy<Value = Element> {
    prop::sample::select(Element::ALL.to_vec())
}

/// Any damage type.
pub fn arb_damage_type() -> impl Strategy<Value = DamageType> {
    prop_oneof![
        Just(DamageType::Physical),
        Just(DamageType::Magic),
        Just(DamageType::True),
        Just(DamageType::Attuned),
        arb_element().prop_map(DamageType::Elemental),
    ]
}

/// Stats within the ranges the catalog uses, crits included.
pub fn arb_stats() -> impl Strategy<Value = UnitStats> {
    (
        (200..2000i32, 10..150i32, 0..150i32, 0..150i32),
        (40..150i32, 1..5i32, 0..60i32, 100..250i32),
        (0..50i32, 0..40i32, 0..30i32),
    )
        .prop_map(
            |(
                (max_health, attack, armor, magic_resist),
                (attack_speed, range, crit_chance, crit_damage),
                (bonus_damage, damage_reduction, lifesteal),
            )| UnitStats {
                max_health,
                attack,
                armor,
                magic_resist,
                attack_speed,
                range,
                crit_chance,
                crit_damage,
                bonus_damage,
                damage_reduction,
                lifesteal,
                ..UnitStats::default()
            },
        )
}

/// Every cell of a player's deployment half.
#[must_use]
pub fn deploy_cells() -> Vec<HexCoord> {
    (0..HALF_HEIGHT)
        .flat_map(|y| (0..BOARD_WIDTH).map(move |x| HexCoord::new(x, y)))
        .collect()
}

/// A roster of `1..=max` units on distinct deployment cells.
pub fn arb_team(max: usize) -> impl Strategy<Value = Vec<UnitSpec>> {
    (
        prop::sample::subsequence(deploy_cells(), 1..=max),
        prop::collection::vec(arb_stats(), max),
    )
        .prop_map(|(cells, stats)| {
            cells
                .into_iter()
                .zip(stats)
                .map(|(cell, stats)| {
                    unit("prop")
                        .at(cell.x, cell.y)
                        .stats(|s| *s = stats)
                        .build()
                })
                .collect()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_cells_cover_half() {
        let cells = deploy_cells();
        assert_eq!(cells.len(), (BOARD_WIDTH * HALF_HEIGHT) as usize);
        assert!(cells.iter().all(|c| arena_core::hex::is_valid_deploy(*c)));
    }

    proptest! {
        #[test]
        fn prop_team_cells_distinct(team in arb_team(6)) {
            let mut cells: Vec<HexCoord> = team.iter().map(|u| u.position).collect();
            cells.sort_by_key(|c| (c.y, c.x));
            cells.dedup();
            prop_assert_eq!(cells.len(), team.len());
        }
    }
}
