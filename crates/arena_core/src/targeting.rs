//! Target selection for basic attacks and abilities.
//!
//! Every selector works on the simulator's unit arena and breaks ties by
//! unit id, so the same board always yields the same targets.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::ability::TargetMode;
use crate::hex::CART_CELL_SPACING;
use crate::unit::{CombatUnit, UnitId};

/// Living, targetable enemies of `caster`, in id order.
fn enemies<'a>(
    units: &'a [CombatUnit],
    caster: &'a CombatUnit,
    tick: u32,
) -> impl Iterator<Item = &'a CombatUnit> + 'a {
    units
        .iter()
        .filter(move |u| u.side != caster.side && u.is_targetable(tick))
}

/// Living allies of `caster`, caster included, in id order.
fn allies<'a>(
    units: &'a [CombatUnit],
    caster: &'a CombatUnit,
) -> impl Iterator<Item = &'a CombatUnit> + 'a {
    units
        .iter()
        .filter(move |u| u.side == caster.side && u.alive)
}

/// Nearest targetable enemy by hex distance, then column offset, then id.
#[must_use]
pub fn nearest_enemy(
    units: &[CombatUnit],
    unit: UnitId,
    tick: u32,
    exclude: Option<UnitId>,
) -> Option<UnitId> {
    let me = units.get(unit.index())?;
    enemies(units, me, tick)
        .filter(|e| Some(e.id) != exclude)
        .min_by_key(|e| {
            (
                me.position.distance(e.position),
                me.position.horizontal_offset(e.position),
                e.id,
            )
        })
        .map(|e| e.id)
}

/// The caster's current target if it can still be hit, else the nearest enemy.
fn current_target(units: &[CombatUnit], caster: &CombatUnit, tick: u32) -> Option<UnitId> {
    caster
        .target
        .and_then(|t| units.get(t.index()))
        .filter(|t| t.side != caster.side && t.is_targetable(tick))
        .map(|t| t.id)
        .or_else(|| nearest_enemy(units, caster.id, tick, None))
}

/// Units affected by an ability cast with `mode`. Empty when nothing qualifies.
pub fn ability_targets<R: Rng + ?Sized>(
    units: &[CombatUnit],
    caster: UnitId,
    mode: TargetMode,
    tick: u32,
    rng: &mut R,
) -> Vec<UnitId> {
    let Some(me) = units.get(caster.index()) else {
        return Vec::new();
    };

    match mode {
        TargetMode::CurrentTarget => current_target(units, me, tick).into_iter().collect(),
        TargetMode::LowestHealthEnemy => enemies(units, me, tick)
            .min_by_key(|e| (e.health, e.id))
            .map(|e| e.id)
            .into_iter()
            .collect(),
        TargetMode::HighestHealthEnemy => enemies(units, me, tick)
            .min_by_key(|e| (std::cmp::Reverse(e.health), e.id))
            .map(|e| e.id)
            .into_iter()
            .collect(),
        TargetMode::FarthestEnemy => enemies(units, me, tick)
            .min_by_key(|e| (std::cmp::Reverse(me.position.distance(e.position)), e.id))
            .map(|e| e.id)
            .into_iter()
            .collect(),
        TargetMode::Backline => enemies(units, me, tick)
            .min_by_key(|e| {
                (
                    std::cmp::Reverse(me.side.depth(e.position)),
                    me.position.distance(e.position),
                    e.id,
                )
            })
            .map(|e| e.id)
            .into_iter()
            .collect(),
        TargetMode::LowestHealthPercentAlly => allies(units, me)
            .min_by_key(|a| (a.health_fraction(), a.id))
            .map(|a| a.id)
            .into_iter()
            .collect(),
        TargetMode::EnemiesInRadius(radius) => {
            let Some(center) = current_target(units, me, tick) else {
                return Vec::new();
            };
            let center = units[center.index()].position;
            enemies(units, me, tick)
                .filter(|e| e.position.distance(center) <= radius)
                .map(|e| e.id)
                .collect()
        }
        TargetMode::AdjacentToTarget => {
            let Some(center) = current_target(units, me, tick) else {
                return Vec::new();
            };
            let center = units[center.index()].position;
            enemies(units, me, tick)
                .filter(|e| e.position.distance(center) <= 1)
                .map(|e| e.id)
                .collect()
        }
        TargetMode::AllEnemies => enemies(units, me, tick).map(|e| e.id).collect(),
        TargetMode::AllAllies => allies(units, me).map(|a| a.id).collect(),
        TargetMode::RandomEnemies(count) => {
            let candidates: Vec<UnitId> = enemies(units, me, tick).map(|e| e.id).collect();
            candidates
                .choose_multiple(rng, count as usize)
                .copied()
                .collect()
        }
        TargetMode::Line { piercing } => line_targets(units, me, tick, piercing),
        TargetMode::SelfOnly => vec![caster],
    }
}

/// Enemies within one tile of the ray from the caster through its target,
/// ordered by distance along the ray.
fn line_targets(units: &[CombatUnit], me: &CombatUnit, tick: u32, piercing: bool) -> Vec<UnitId> {
    let Some(target) = current_target(units, me, tick) else {
        return Vec::new();
    };
    let (ax, ay) = me.position.to_cartesian();
    let (bx, by) = units[target.index()].position.to_cartesian();
    let (dx, dy) = (i128::from(bx - ax), i128::from(by - ay));
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0 {
        return vec![target];
    }
    let spacing_sq = i128::from(CART_CELL_SPACING) * i128::from(CART_CELL_SPACING);

    let mut hits: Vec<(i128, UnitId)> = enemies(units, me, tick)
        .filter_map(|e| {
            let (ex, ey) = e.position.to_cartesian();
            let (vx, vy) = (i128::from(ex - ax), i128::from(ey - ay));
            let along = vx * dx + vy * dy;
            if along <= 0 {
                return None;
            }
            // perpendicular distance^2 = cross^2 / |d|^2
            let cross = dx * vy - dy * vx;
            (cross * cross <= spacing_sq * length_sq).then_some((along, e.id))
        })
        .collect();
    hits.sort_unstable();

    if piercing {
        hits.into_iter().map(|(_, id)| id).collect()
    } else {
        hits.into_iter().take(1).map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::{HexCoord, Side};
    use crate::passives::UnitPassives;
    use crate::stats::UnitStats;
    use crate::unit::UnitSpec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn unit(id: u32, side: Side, x: i32, y: i32, health: i32) -> CombatUnit {
        let spec = UnitSpec {
            instance_id: u64::from(id),
            template: "dummy".to_string(),
            star: 1,
            position: HexCoord::new(0, 0),
            stats: UnitStats::default(),
            ability: None,
            passives: UnitPassives::default(),
            traits: Vec::new(),
            loot: Vec::new(),
        };
        let mut unit = CombatUnit::from_spec(UnitId(id), side, "p", spec);
        unit.position = HexCoord::new(x, y);
        unit.health = health;
        unit
    }

    fn board() -> Vec<CombatUnit> {
        vec![
            unit(0, Side::Home, 3, 5, 500),
            unit(1, Side::Away, 3, 3, 300),
            unit(2, Side::Away, 4, 3, 450),
            unit(3, Side::Away, 3, 1, 100),
            unit(4, Side::Away, 0, 0, 450),
            unit(5, Side::Home, 2, 5, 100),
        ]
    }

    fn targets(units: &[CombatUnit], mode: TargetMode) -> Vec<UnitId> {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        ability_targets(units, UnitId(0), mode, 0, &mut rng)
    }

    #[test]
    fn test_nearest_enemy_tie_breaks() {
        let units = board();
        // (3,3) and (4,3) are both 2 away; (3,3) shares the column.
        assert_eq!(nearest_enemy(&units, UnitId(0), 0, None), Some(UnitId(1)));
        assert_eq!(
            nearest_enemy(&units, UnitId(0), 0, Some(UnitId(1))),
            Some(UnitId(2))
        );
    }

    #[test]
    fn test_health_modes() {
        let units = board();
        assert_eq!(targets(&units, TargetMode::LowestHealthEnemy), vec![UnitId(3)]);
        // 450 ties between 2 and 4; lower id wins.
        assert_eq!(targets(&units, TargetMode::HighestHealthEnemy), vec![UnitId(2)]);
        assert_eq!(
            targets(&units, TargetMode::LowestHealthPercentAlly),
            vec![UnitId(5)]
        );
    }

    #[test]
    fn test_distance_modes() {
        let units = board();
        assert_eq!(targets(&units, TargetMode::FarthestEnemy), vec![UnitId(4)]);
        assert_eq!(targets(&units, TargetMode::Backline), vec![UnitId(4)]);
    }

    #[test]
    fn test_area_modes_center_on_current_target() {
        let mut units = board();
        units[0].target = Some(UnitId(1));
        assert_eq!(
            targets(&units, TargetMode::AdjacentToTarget),
            vec![UnitId(1), UnitId(2)]
        );
        assert_eq!(
            targets(&units, TargetMode::EnemiesInRadius(2)),
            vec![UnitId(1), UnitId(2), UnitId(3)]
        );
    }

    #[test]
    fn test_untargetable_enemies_are_skipped() {
        let mut units = board();
        units[3].untargetable_until = 100;
        units[1].alive = false;
        assert_eq!(targets(&units, TargetMode::LowestHealthEnemy), vec![UnitId(2)]);
        assert_eq!(
            targets(&units, TargetMode::AllEnemies),
            vec![UnitId(2), UnitId(4)]
        );
    }

    #[test]
    fn test_no_candidates_is_empty() {
        let units = vec![unit(0, Side::Home, 3, 5, 500)];
        for mode in [
            TargetMode::CurrentTarget,
            TargetMode::AllEnemies,
            TargetMode::AdjacentToTarget,
            TargetMode::RandomEnemies(3),
            TargetMode::Line { piercing: true },
        ] {
            assert!(targets(&units, mode).is_empty(), "{mode:?}");
        }
        assert_eq!(targets(&units, TargetMode::SelfOnly), vec![UnitId(0)]);
    }

    #[test]
    fn test_random_enemies_are_distinct() {
        let units = board();
        let picked = targets(&units, TargetMode::RandomEnemies(3));
        assert_eq!(picked.len(), 3);
        let mut unique = picked.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 3);
        assert_eq!(targets(&units, TargetMode::RandomEnemies(10)).len(), 4);
    }

    #[test]
    fn test_line_is_forward_only() {
        let units = vec![
            unit(0, Side::Home, 3, 5, 500),
            unit(1, Side::Away, 3, 4, 300),
            unit(2, Side::Away, 3, 2, 300),
            unit(3, Side::Away, 3, 7, 300),
        ];
        let mut units = units;
        units[0].target = Some(UnitId(1));
        let piercing = targets(&units, TargetMode::Line { piercing: true });
        assert!(piercing.contains(&UnitId(1)));
        assert!(piercing.contains(&UnitId(2)));
        assert!(!piercing.contains(&UnitId(3)));
        assert_eq!(
            targets(&units, TargetMode::Line { piercing: false }),
            vec![UnitId(1)]
        );
    }
}
