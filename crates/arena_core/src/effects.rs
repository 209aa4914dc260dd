//! Status effects and stat buffs carried by combat units.
//!
//! Crowd control (stun, root, frost) is unique per unit: reapplying refreshes
//! the duration to the larger of the two. Damage-over-time effects stack
//! independently per source. Buffs are applied to working stats immediately
//! and reversed exactly when they expire.

use serde::{Deserialize, Serialize};

use crate::stats::{StatKind, UnitStats};
use crate::unit::UnitId;

/// Ticks between two damage-over-time pulses.
pub const DOT_INTERVAL_TICKS: u32 = 20;

/// Kind of status effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    /// Cannot move, attack or gain mana.
    Stun,
    /// Cannot move.
    Root,
    /// Slows attacks and movement by `slow_pct`.
    Frost,
    /// Physical damage over time.
    Bleed,
    /// Fire damage over time.
    Burn,
    /// Damage over time.
    Poison,
}

impl StatusKind {
    /// Crowd control effects are unique per unit.
    #[must_use]
    pub const fn is_crowd_control(self) -> bool {
        matches!(self, StatusKind::Stun | StatusKind::Root | StatusKind::Frost)
    }

    /// Damage-over-time effects pulse every [`DOT_INTERVAL_TICKS`].
    #[must_use]
    pub const fn is_damage_over_time(self) -> bool {
        !self.is_crowd_control()
    }
}

/// An active status effect on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Effect kind.
    pub kind: StatusKind,
    /// Ticks left before expiry.
    pub remaining: u32,
    /// Unit that applied the effect.
    pub source: UnitId,
    /// Damage per pulse for damage-over-time kinds.
    pub dps: u32,
    /// Slow percent for frost.
    pub slow_pct: i32,
    /// Tick of the last pulse (or of application).
    pub last_pulse: u32,
}

/// One damage-over-time pulse produced by [`StatusEffects::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotPulse {
    /// Effect kind that pulsed.
    pub kind: StatusKind,
    /// Unit credited with the damage.
    pub source: UnitId,
    /// Damage to deal.
    pub amount: u32,
}

/// Status effects on a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffects {
    effects: Vec<StatusEffect>,
}

impl StatusEffects {
    /// Apply an effect, honoring crowd-control uniqueness and per-source stacking.
    ///
    /// Returns the duration the effect now has.
    pub fn apply(&mut self, effect: StatusEffect) -> u32 {
        let existing = self.effects.iter_mut().find(|e| {
            e.kind == effect.kind && (effect.kind.is_crowd_control() || e.source == effect.source)
        });

        match existing {
            Some(current) => {
                current.remaining = current.remaining.max(effect.remaining);
                current.dps = current.dps.max(effect.dps);
                current.slow_pct = current.slow_pct.max(effect.slow_pct);
                current.remaining
            }
            None => {
                self.effects.push(effect);
                effect.remaining
            }
        }
    }

    /// Whether any effect of `kind` is active.
    #[must_use]
    pub fn has(&self, kind: StatusKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    /// Number of active entries of `kind`.
    #[must_use]
    pub fn count(&self, kind: StatusKind) -> usize {
        self.effects.iter().filter(|e| e.kind == kind).count()
    }

    /// Remaining ticks of the `kind` entry, if present.
    #[must_use]
    pub fn remaining(&self, kind: StatusKind) -> Option<u32> {
        self.effects
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.remaining)
            .max()
    }

    /// Whether the unit is stunned.
    #[must_use]
    pub fn is_stunned(&self) -> bool {
        self.has(StatusKind::Stun)
    }

    /// Whether the unit cannot move.
    #[must_use]
    pub fn is_immobile(&self) -> bool {
        self.has(StatusKind::Stun) || self.has(StatusKind::Root)
    }

    /// Current slow percent, zero when not frosted.
    #[must_use]
    pub fn slow_pct(&self) -> i32 {
        self.effects
            .iter()
            .filter(|e| e.kind == StatusKind::Frost)
            .map(|e| e.slow_pct)
            .max()
            .unwrap_or(0)
    }

    /// Advance one tick: pulse due damage-over-time effects, then decrement
    /// durations and drop expired entries.
    pub fn advance(&mut self, tick: u32) -> Vec<DotPulse> {
        let mut pulses = Vec::new();
        for effect in &mut self.effects {
            if effect.kind.is_damage_over_time()
                && tick.saturating_sub(effect.last_pulse) >= DOT_INTERVAL_TICKS
            {
                effect.last_pulse = tick;
                pulses.push(DotPulse {
                    kind: effect.kind,
                    source: effect.source,
                    amount: effect.dps,
                });
            }
            effect.remaining = effect.remaining.saturating_sub(1);
        }
        self.effects.retain(|e| e.remaining > 0);
        pulses
    }

    /// Remove every effect (on death or revive).
    pub fn clear(&mut self) {
        self.effects.clear();
    }

    /// Iterate active effects.
    pub fn iter(&self) -> impl Iterator<Item = &StatusEffect> {
        self.effects.iter()
    }
}

/// A stat modification with an optional duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buff {
    /// Modified stat.
    pub stat: StatKind,
    /// Signed amount added to the stat.
    pub delta: i32,
    /// Ticks left, or `None` for a permanent buff.
    pub remaining: Option<u32>,
}

impl Buff {
    /// A buff that expires after `ticks`.
    #[must_use]
    pub const fn timed(stat: StatKind, delta: i32, ticks: u32) -> Self {
        Self {
            stat,
            delta,
            remaining: Some(ticks),
        }
    }

    /// A buff that lasts for the rest of combat.
    #[must_use]
    pub const fn permanent(stat: StatKind, delta: i32) -> Self {
        Self {
            stat,
            delta,
            remaining: None,
        }
    }
}

/// Buffs on a single unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffs {
    active: Vec<Buff>,
}

impl Buffs {
    /// Apply a buff to `stats` and track it.
    pub fn apply(&mut self, stats: &mut UnitStats, buff: Buff) {
        stats.add(buff.stat, buff.delta);
        self.active.push(buff);
    }

    /// Decrement timed buffs, undoing each one that expires.
    ///
    /// Returns the buffs that expired this tick.
    pub fn advance(&mut self, stats: &mut UnitStats) -> Vec<Buff> {
        let mut expired = Vec::new();
        self.active.retain_mut(|buff| {
            let Some(remaining) = buff.remaining.as_mut() else {
                return true;
            };
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                stats.add(buff.stat, -buff.delta);
                expired.push(*buff);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Number of tracked buffs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no buffs are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Iterate tracked buffs.
    pub fn iter(&self) -> impl Iterator<Item = &Buff> {
        self.active.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stun(remaining: u32, source: u32) -> StatusEffect {
        StatusEffect {
            kind: StatusKind::Stun,
            remaining,
            source: UnitId(source),
            dps: 0,
            slow_pct: 0,
            last_pulse: 0,
        }
    }

    fn burn(source: u32, dps: u32) -> StatusEffect {
        StatusEffect {
            kind: StatusKind::Burn,
            remaining: 60,
            source: UnitId(source),
            dps,
            slow_pct: 0,
            last_pulse: 0,
        }
    }

    #[test]
    fn test_crowd_control_refreshes_to_max() {
        let mut effects = StatusEffects::default();
        effects.apply(stun(30, 1));
        effects.apply(stun(10, 2));
        assert_eq!(effects.count(StatusKind::Stun), 1);
        assert_eq!(effects.remaining(StatusKind::Stun), Some(30));

        effects.apply(stun(50, 3));
        assert_eq!(effects.count(StatusKind::Stun), 1);
        assert_eq!(effects.remaining(StatusKind::Stun), Some(50));
    }

    #[test]
    fn test_dots_stack_per_source() {
        let mut effects = StatusEffects::default();
        effects.apply(burn(1, 10));
        effects.apply(burn(2, 10));
        effects.apply(burn(1, 15));
        assert_eq!(effects.count(StatusKind::Burn), 2);
    }

    #[test]
    fn test_dot_pulses_every_interval() {
        let mut effects = StatusEffects::default();
        effects.apply(burn(1, 10));

        let mut pulses = 0;
        for tick in 1..=60 {
            pulses += effects.advance(tick).len();
        }
        assert_eq!(pulses, 3);
        assert!(!effects.has(StatusKind::Burn));
    }

    #[test]
    fn test_frost_slow() {
        let mut effects = StatusEffects::default();
        assert_eq!(effects.slow_pct(), 0);
        effects.apply(StatusEffect {
            kind: StatusKind::Frost,
            remaining: 20,
            source: UnitId(0),
            dps: 0,
            slow_pct: 30,
            last_pulse: 0,
        });
        assert_eq!(effects.slow_pct(), 30);
        assert!(!effects.is_immobile());
    }

    #[test]
    fn test_timed_buff_reverses_exactly() {
        let mut stats = UnitStats::default();
        let before = stats;
        let mut buffs = Buffs::default();

        buffs.apply(&mut stats, Buff::timed(StatKind::Attack, 40, 3));
        buffs.apply(&mut stats, Buff::timed(StatKind::Armor, -15, 2));
        assert_eq!(stats.attack, before.attack + 40);

        for _ in 0..3 {
            buffs.advance(&mut stats);
        }
        assert_eq!(stats, before);
        assert!(buffs.is_empty());
    }

    #[test]
    fn test_permanent_buff_never_expires() {
        let mut stats = UnitStats::default();
        let mut buffs = Buffs::default();
        buffs.apply(&mut stats, Buff::permanent(StatKind::Attack, 10));
        for _ in 0..1000 {
            assert!(buffs.advance(&mut stats).is_empty());
        }
        assert_eq!(stats.attack, UnitStats::default().attack + 10);
    }
}
