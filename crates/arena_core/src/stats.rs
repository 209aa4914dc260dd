//! Unit stat blocks and damage classification.
//!
//! Every stat is an integer so that buffs can be applied and undone exactly.
//! Percent-valued stats are whole percentages (`25` means 25%).

use serde::{Deserialize, Serialize};

/// Elemental affinity rolled once per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Element {
    /// Fire. Mitigated additionally by `fire_resist`.
    #[default]
    Fire,
    /// Frost.
    Frost,
    /// Lightning.
    Lightning,
}

impl Element {
    /// Every element, in roll order.
    pub const ALL: [Element; 3] = [Element::Fire, Element::Frost, Element::Lightning];
}

/// Damage classification for attacks and abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DamageType {
    /// Mitigated by armor.
    #[default]
    Physical,
    /// Mitigated by magic resist.
    Magic,
    /// Elemental damage, mitigated by magic resist (plus fire resist for fire).
    Elemental(Element),
    /// Resolves to the match's rolled element when dealt.
    Attuned,
    /// Bypasses mitigation. Used for damage-over-time ticks and reflects.
    True,
}

impl DamageType {
    /// Resolve `Attuned` against the match's element.
    #[must_use]
    pub const fn resolve(self, attuned: Element) -> Self {
        match self {
            DamageType::Attuned => DamageType::Elemental(attuned),
            other => other,
        }
    }

    /// The element carried by this damage, if any.
    #[must_use]
    pub const fn element(self) -> Option<Element> {
        match self {
            DamageType::Elemental(element) => Some(element),
            _ => None,
        }
    }
}

/// A stat that buffs can modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatKind {
    /// Maximum health.
    MaxHealth,
    /// Basic attack damage.
    Attack,
    /// Physical mitigation.
    Armor,
    /// Non-physical mitigation.
    MagicResist,
    /// Attacks per second in hundredths.
    AttackSpeed,
    /// Attack range in hexes.
    Range,
    /// Hexes per second in hundredths.
    MoveSpeed,
    /// Crit chance percent.
    CritChance,
    /// Crit damage percent.
    CritDamage,
    /// Ability power percent.
    AbilityPower,
    /// Outgoing damage bonus percent.
    BonusDamage,
    /// Incoming damage reduction percent.
    DamageReduction,
    /// Fire resist percent.
    FireResist,
    /// Lifesteal percent.
    Lifesteal,
}

/// Flat stat grant used by traits, items, crests and buffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatGrant {
    /// Stat to modify.
    pub stat: StatKind,
    /// Signed amount.
    pub value: i32,
}

impl StatGrant {
    /// Create a stat grant.
    #[must_use]
    pub const fn new(stat: StatKind, value: i32) -> Self {
        Self { stat, value }
    }
}

/// Combat stat block for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitStats {
    /// Maximum health.
    pub max_health: i32,
    /// Basic attack damage.
    pub attack: i32,
    /// Physical mitigation.
    pub armor: i32,
    /// Non-physical mitigation.
    pub magic_resist: i32,
    /// Attacks per second in hundredths (`75` = 0.75/s).
    pub attack_speed: i32,
    /// Attack range in hexes. `1` is melee.
    pub range: i32,
    /// Hexes per second in hundredths.
    pub move_speed: i32,
    /// Crit chance percent.
    pub crit_chance: i32,
    /// Crit damage percent (`150` = x1.5).
    pub crit_damage: i32,
    /// Ability power percent (`100` = neutral).
    pub ability_power: i32,
    /// Outgoing damage bonus percent.
    pub bonus_damage: i32,
    /// Incoming damage reduction percent.
    pub damage_reduction: i32,
    /// Fire resist percent.
    pub fire_resist: i32,
    /// Lifesteal percent.
    pub lifesteal: i32,
    /// Mana required to cast. `0` means the unit never casts.
    pub max_mana: i32,
    /// Mana at combat start.
    pub starting_mana: i32,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self {
            max_health: 500,
            attack: 50,
            armor: 20,
            magic_resist: 20,
            attack_speed: 70,
            range: 1,
            move_speed: 200,
            crit_chance: 25,
            crit_damage: 150,
            ability_power: 100,
            bonus_damage: 0,
            damage_reduction: 0,
            fire_resist: 0,
            lifesteal: 0,
            max_mana: 60,
            starting_mana: 0,
        }
    }
}

impl UnitStats {
    /// Read a stat.
    #[must_use]
    pub const fn get(&self, stat: StatKind) -> i32 {
        match stat {
            StatKind::MaxHealth => self.max_health,
            StatKind::Attack => self.attack,
            StatKind::Armor => self.armor,
            StatKind::MagicResist => self.magic_resist,
            StatKind::AttackSpeed => self.attack_speed,
            StatKind::Range => self.range,
            StatKind::MoveSpeed => self.move_speed,
            StatKind::CritChance => self.crit_chance,
            StatKind::CritDamage => self.crit_damage,
            StatKind::AbilityPower => self.ability_power,
            StatKind::BonusDamage => self.bonus_damage,
            StatKind::DamageReduction => self.damage_reduction,
            StatKind::FireResist => self.fire_resist,
            StatKind::Lifesteal => self.lifesteal,
        }
    }

    fn slot(&mut self, stat: StatKind) -> &mut i32 {
        match stat {
            StatKind::MaxHealth => &mut self.max_health,
            StatKind::Attack => &mut self.attack,
            StatKind::Armor => &mut self.armor,
            StatKind::MagicResist => &mut self.magic_resist,
            StatKind::AttackSpeed => &mut self.attack_speed,
            StatKind::Range => &mut self.range,
            StatKind::MoveSpeed => &mut self.move_speed,
            StatKind::CritChance => &mut self.crit_chance,
            StatKind::CritDamage => &mut self.crit_damage,
            StatKind::AbilityPower => &mut self.ability_power,
            StatKind::BonusDamage => &mut self.bonus_damage,
            StatKind::DamageReduction => &mut self.damage_reduction,
            StatKind::FireResist => &mut self.fire_resist,
            StatKind::Lifesteal => &mut self.lifesteal,
        }
    }

    /// Add a signed delta to a stat. Exact inverse of `add(stat, -delta)`.
    pub fn add(&mut self, stat: StatKind, delta: i32) {
        let slot = self.slot(stat);
        *slot = slot.saturating_add(delta);
    }

    /// Apply a list of grants in order.
    pub fn apply_grants(&mut self, grants: &[StatGrant]) {
        for grant in grants {
            self.add(grant.stat, grant.value);
        }
    }

    /// Ticks between basic attacks at the given tick rate, never below 1.
    #[must_use]
    pub fn attack_interval(&self, tick_rate: u32) -> u32 {
        per_hundred(tick_rate, self.attack_speed)
    }

    /// Ticks to cross one hex at the given tick rate, never below 1.
    #[must_use]
    pub fn ticks_per_hex(&self, tick_rate: u32) -> u32 {
        per_hundred(tick_rate, self.move_speed)
    }

    /// Whether this unit attacks at range.
    #[must_use]
    pub const fn is_ranged(&self) -> bool {
        self.range > 1
    }
}

/// Ticks per action for a speed in hundredths of an action per second.
fn per_hundred(tick_rate: u32, speed: i32) -> u32 {
    let speed = u32::try_from(speed.max(10)).unwrap_or(10);
    (tick_rate.saturating_mul(100) / speed).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_reversible() {
        let mut stats = UnitStats::default();
        let before = stats;
        stats.add(StatKind::Armor, 35);
        assert_eq!(stats.armor, before.armor + 35);
        stats.add(StatKind::Armor, -35);
        assert_eq!(stats, before);
    }

    #[test]
    fn test_get_matches_fields() {
        let stats = UnitStats {
            attack: 77,
            lifesteal: 12,
            ..UnitStats::default()
        };
        assert_eq!(stats.get(StatKind::Attack), 77);
        assert_eq!(stats.get(StatKind::Lifesteal), 12);
    }

    #[test]
    fn test_intervals() {
        let stats = UnitStats {
            attack_speed: 100,
            move_speed: 200,
            ..UnitStats::default()
        };
        assert_eq!(stats.attack_interval(20), 20);
        assert_eq!(stats.ticks_per_hex(20), 10);
    }

    #[test]
    fn test_intervals_saturate() {
        let stats = UnitStats {
            attack_speed: -50,
            move_speed: i32::MAX,
            ..UnitStats::default()
        };
        assert_eq!(stats.attack_interval(20), 200);
        assert_eq!(stats.attack_interval(u32::MAX), u32::MAX / 10);
        assert_eq!(stats.ticks_per_hex(20), 1);
    }

    #[test]
    fn test_attuned_resolution() {
        assert_eq!(
            DamageType::Attuned.resolve(Element::Frost),
            DamageType::Elemental(Element::Frost)
        );
        assert_eq!(DamageType::Magic.resolve(Element::Frost), DamageType::Magic);
    }
}
