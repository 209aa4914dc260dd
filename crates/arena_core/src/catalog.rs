//! Reference unit catalog.
//!
//! A [`Catalog`] is parsed from RON, validated once, and then serves as the
//! room's [`StatProvider`]. [`Catalog::builtin`] loads the catalog shipped
//! with the crate.
//!
//! # Example
//!
//! ```
//! use arena_core::catalog::Catalog;
//! use arena_core::services::StatProvider;
//!
//! let catalog = Catalog::builtin().expect("built-in catalog is valid");
//! let one = catalog.base_stats("knight", 1).expect("knight exists");
//! let two = catalog.base_stats("knight", 2).expect("knight exists");
//! assert!(two.max_health > one.max_health);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::ability::Ability;
use crate::data::{CrestData, ItemData, TraitData, UnitData, WaveData};
use crate::error::{ArenaError, Result};
use crate::math::scale_pct;
use crate::passives::UnitPassives;
use crate::room::RoundKind;
use crate::roster::{BoardUnit, MAX_STAR};
use crate::services::{StatProvider, TraitActivation};
use crate::simulation::{MatchVariables, TeamModifiers, WarlordBoost};
use crate::stats::{Element, StatGrant, UnitStats};
use crate::unit::UnitSpec;

const BUILTIN: &str = include_str!("data/catalog.ron");

fn default_star_scaling() -> i32 {
    180
}

/// Raw catalog file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogData {
    /// Health and attack percent multiplier per star above one.
    #[serde(default = "default_star_scaling")]
    pub star_scaling_pct: i32,
    /// Pool copies per template, by cost tier.
    pub pool_sizes: Vec<u32>,
    /// Shop odds per level, by cost tier.
    pub shop_odds: Vec<Vec<u32>>,
    /// Unit templates.
    pub units: Vec<UnitData>,
    /// Traits.
    #[serde(default)]
    pub traits: Vec<TraitData>,
    /// Items.
    #[serde(default)]
    pub items: Vec<ItemData>,
    /// Crests.
    #[serde(default)]
    pub crests: Vec<CrestData>,
    /// PvE waves.
    #[serde(default)]
    pub waves: Vec<WaveData>,
    /// Candidate blessings; one is rolled per match.
    #[serde(default)]
    pub blessings: Vec<Vec<StatGrant>>,
    /// Warlord boost, if the mode uses one.
    #[serde(default)]
    pub warlord: Option<WarlordBoost>,
}

impl CatalogData {
    /// Check cross references. Returns one message per problem.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for unit in &self.units {
            if !seen.insert(unit.id.as_str()) {
                errors.push(format!("Duplicate unit id '{}'", unit.id));
            }
            if unit.cost as usize > self.pool_sizes.len() {
                errors.push(format!(
                    "Unit '{}' has cost {} but only {} cost tiers exist",
                    unit.id,
                    unit.cost,
                    self.pool_sizes.len()
                ));
            }
            for tag in &unit.traits {
                if !self.traits.iter().any(|t| &t.id == tag) {
                    errors.push(format!("Unit '{}' references unknown trait '{tag}'", unit.id));
                }
            }
        }

        for (level, odds) in self.shop_odds.iter().enumerate() {
            if odds.len() != self.pool_sizes.len() {
                errors.push(format!("Shop odds for level {} have the wrong length", level + 1));
            }
            if odds.iter().sum::<u32>() != 100 {
                errors.push(format!("Shop odds for level {} do not sum to 100", level + 1));
            }
        }

        for data in &self.traits {
            if data.tiers.windows(2).any(|w| w[0].count >= w[1].count) {
                errors.push(format!("Trait '{}' tiers are not ascending", data.id));
            }
        }

        for wave in &self.waves {
            for unit in &wave.units {
                if !seen.contains(unit.template.as_str()) {
                    errors.push(format!(
                        "{:?} wave references unknown unit '{}'",
                        wave.kind, unit.template
                    ));
                }
                if unit.star == 0 || unit.star > MAX_STAR {
                    errors.push(format!("Wave unit '{}' has invalid star", unit.template));
                }
            }
        }

        errors
    }
}

/// Validated catalog with id lookups.
#[derive(Debug, Clone)]
pub struct Catalog {
    data: CatalogData,
    units: BTreeMap<String, usize>,
    items: BTreeMap<String, usize>,
    crests: BTreeMap<String, usize>,
}

impl Catalog {
    /// Parse and validate a catalog.
    ///
    /// # Errors
    ///
    /// `DataParseError` if the text is not valid RON or fails validation.
    pub fn from_ron(source_name: &str, text: &str) -> Result<Self> {
        let data: CatalogData = ron::from_str(text).map_err(|e| ArenaError::DataParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        Self::from_data(source_name, data)
    }

    /// Validate already parsed data.
    ///
    /// # Errors
    ///
    /// `DataParseError` listing every validation failure.
    pub fn from_data(source_name: &str, data: CatalogData) -> Result<Self> {
        let errors = data.validate();
        if !errors.is_empty() {
            return Err(ArenaError::DataParseError {
                source_name: source_name.to_string(),
                message: errors.join("; "),
            });
        }

        let index = |ids: Vec<&String>| -> BTreeMap<String, usize> {
            ids.into_iter()
                .enumerate()
                .map(|(i, id)| (id.clone(), i))
                .collect()
        };
        let units = index(data.units.iter().map(|u| &u.id).collect());
        let items = index(data.items.iter().map(|i| &i.id).collect());
        let crests = index(data.crests.iter().map(|c| &c.id).collect());

        tracing::info!(
            source = source_name,
            units = data.units.len(),
            traits = data.traits.len(),
            items = data.items.len(),
            crests = data.crests.len(),
            "Loaded catalog"
        );

        Ok(Self {
            data,
            units,
            items,
            crests,
        })
    }

    /// The catalog shipped with the crate.
    ///
    /// # Errors
    ///
    /// Only if the embedded file is broken.
    pub fn builtin() -> Result<Self> {
        Self::from_ron("builtin", BUILTIN)
    }

    /// Raw data.
    #[must_use]
    pub fn data(&self) -> &CatalogData {
        &self.data
    }

    /// Look up a unit template.
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<&UnitData> {
        self.units.get(id).map(|&i| &self.data.units[i])
    }

    /// Look up an item.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&ItemData> {
        self.items.get(id).map(|&i| &self.data.items[i])
    }

    /// Look up a crest.
    #[must_use]
    pub fn crest(&self, id: &str) -> Option<&CrestData> {
        self.crests.get(id).map(|&i| &self.data.crests[i])
    }

    /// Shop cost of a template, `None` for unknown or PvE-only units.
    #[must_use]
    pub fn unit_cost(&self, id: &str) -> Option<u32> {
        self.unit(id).map(|u| u.cost).filter(|&c| c > 0)
    }

    /// Purchasable templates of a cost tier, in catalog order.
    pub fn units_of_cost(&self, cost: u32) -> impl Iterator<Item = &UnitData> {
        self.data.units.iter().filter(move |u| u.cost == cost)
    }

    fn wave_for(&self, round: u32, kind: RoundKind) -> Option<&WaveData> {
        self.data
            .waves
            .iter()
            .find(|w| w.round == Some(round))
            .or_else(|| {
                self.data
                    .waves
                    .iter()
                    .find(|w| w.kind == kind && w.round.is_none())
            })
    }
}

impl StatProvider for Catalog {
    fn base_stats(&self, template: &str, star: u8) -> Option<UnitStats> {
        let mut stats = self.unit(template)?.stats;
        for _ in 1..star.clamp(1, MAX_STAR) {
            stats.max_health =
                scale_pct(stats.max_health.max(0) as u32, self.data.star_scaling_pct) as i32;
            stats.attack = scale_pct(stats.attack.max(0) as u32, self.data.star_scaling_pct) as i32;
        }
        Some(stats)
    }

    fn ability(&self, template: &str) -> Option<Ability> {
        self.unit(template).and_then(|u| u.ability.clone())
    }

    fn unit_passives(&self, template: &str) -> UnitPassives {
        self.unit(template)
            .map(|u| u.passives.clone())
            .unwrap_or_default()
    }

    fn unit_traits(&self, template: &str) -> Vec<String> {
        self.unit(template)
            .map(|u| u.traits.clone())
            .unwrap_or_default()
    }

    fn trait_activations(&self, board: &[BoardUnit]) -> Vec<TraitActivation> {
        // Traits count distinct templates, not copies.
        let mut members: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for placed in board {
            if let Some(unit) = self.unit(&placed.unit.template) {
                for tag in &unit.traits {
                    members
                        .entry(tag.as_str())
                        .or_default()
                        .insert(unit.id.as_str());
                }
            }
        }

        self.data
            .traits
            .iter()
            .filter_map(|data| {
                let count = members.get(data.id.as_str()).map_or(0, BTreeSet::len) as u32;
                let (tier, reached) = data.active_tier(count)?;
                Some(TraitActivation {
                    trait_id: data.id.clone(),
                    count,
                    tier,
                    grants: reached.grants.clone(),
                    passives: reached.passives.clone(),
                    modifiers: reached.modifiers,
                    team_wide: data.team_wide,
                })
            })
            .collect()
    }

    fn apply_item_bonuses(&self, unit: &mut UnitSpec, items: &[String]) {
        for id in items {
            match self.item(id) {
                Some(item) => {
                    unit.stats.apply_grants(&item.grants);
                    unit.passives.merge(&item.passives);
                }
                None => tracing::warn!(item = %id, template = %unit.template, "Unknown item ignored"),
            }
        }
    }

    fn apply_crest_bonuses(&self, unit: &mut UnitSpec, crest: Option<&str>) {
        if let Some(data) = crest.and_then(|id| self.crest(id)) {
            unit.stats.apply_grants(&data.grants);
        }
    }

    fn team_modifiers(&self, activations: &[TraitActivation], crest: Option<&str>) -> TeamModifiers {
        let from_traits = activations
            .iter()
            .fold(TeamModifiers::default(), |acc, a| acc.combine(a.modifiers));
        let from_crest = crest
            .and_then(|id| self.crest(id))
            .map(|c| c.modifiers)
            .unwrap_or_default();
        from_traits.combine(from_crest)
    }

    fn roll_match_variables(&self, rng: &mut ChaCha8Rng) -> MatchVariables {
        MatchVariables {
            attuned_element: Element::ALL.choose(rng).copied().unwrap_or_default(),
            blessing: self.data.blessings.choose(rng).cloned().unwrap_or_default(),
            warlord: self.data.warlord,
        }
    }

    fn pve_wave(&self, round: u32, kind: RoundKind) -> Vec<UnitSpec> {
        let Some(wave) = self.wave_for(round, kind) else {
            tracing::warn!(round, ?kind, "No wave defined, round has no hostiles");
            return Vec::new();
        };
        wave.units
            .iter()
            .enumerate()
            .map(|(i, unit)| UnitSpec {
                instance_id: i as u64,
                template: unit.template.clone(),
                star: unit.star,
                position: unit.position,
                stats: self.base_stats(&unit.template, unit.star).unwrap_or_default(),
                ability: self.ability(&unit.template),
                passives: self.unit_passives(&unit.template),
                traits: self.unit_traits(&unit.template),
                loot: unit.loot.clone(),
            })
            .collect()
    }

    fn crest_offers(&self, rng: &mut ChaCha8Rng, count: usize) -> Vec<String> {
        self.data
            .crests
            .choose_multiple(rng, count)
            .map(|c| c.id.clone())
            .collect()
    }

    fn merchant_items(&self, rng: &mut ChaCha8Rng, count: usize) -> Vec<String> {
        // Repeats allowed when more players than distinct items.
        (0..count)
            .filter_map(|_| self.data.items.choose(rng).map(|i| i.id.clone()))
            .collect()
    }

    fn is_known_item(&self, item: &str) -> bool {
        self.items.contains_key(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HexCoord;
    use crate::roster::RosterUnit;
    use crate::stats::StatKind;
    use rand::SeedableRng;

    fn board(templates: &[&str]) -> Vec<BoardUnit> {
        templates
            .iter()
            .enumerate()
            .map(|(i, t)| BoardUnit {
                unit: RosterUnit::new(i as u64, *t),
                position: HexCoord::new(i as i32, 0),
            })
            .collect()
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin().expect("valid");
        assert!(catalog.unit("knight").is_some());
        assert!(catalog.unit_cost("creep").is_none());
        assert_eq!(catalog.unit_cost("oracle"), Some(5));
        assert!(catalog.is_known_item("guardian_angel"));
    }

    #[test]
    fn test_star_scaling() {
        let catalog = Catalog::builtin().expect("valid");
        let one = catalog.base_stats("knight", 1).expect("exists");
        let two = catalog.base_stats("knight", 2).expect("exists");
        assert_eq!(two.max_health, one.max_health * 180 / 100);
        assert_eq!(two.armor, one.armor);
    }

    #[test]
    fn test_traits_count_distinct_templates() {
        let catalog = Catalog::builtin().expect("valid");
        let duplicate = catalog.trait_activations(&board(&["knight", "knight"]));
        assert!(duplicate.iter().all(|a| a.trait_id != "guardian"));

        let pair = catalog.trait_activations(&board(&["knight", "warden"]));
        let guardian = pair
            .iter()
            .find(|a| a.trait_id == "guardian")
            .expect("guardian active");
        assert_eq!(guardian.count, 2);
        assert_eq!(guardian.tier, 0);
    }

    #[test]
    fn test_bonus_order_trait_item_crest() {
        let catalog = Catalog::builtin().expect("valid");
        let mut placed = board(&["knight", "warden"]);
        placed[0].unit.items = vec!["chain_vest".to_string(), "missing".to_string()];
        let team = crate::services::build_team(&catalog, "p1", &placed, Some("iron_will"));
        let knight = &team.units[0];
        let base = catalog.base_stats("knight", 1).expect("exists");
        assert_eq!(knight.stats.armor, base.armor + 20 + 25);
        assert_eq!(knight.stats.get(StatKind::MaxHealth), base.max_health + 100);
    }

    #[test]
    fn test_invalid_data_is_rejected() {
        let text = r#"(pool_sizes: [10], shop_odds: [[90]], units: [(id: "x", name: "X", cost: 3, traits: ["nope"], stats: (attack: 10))])"#;
        let err = Catalog::from_ron("inline", text).expect_err("invalid");
        let message = err.to_string();
        assert!(message.contains("cost 3"));
        assert!(message.contains("unknown trait"));
        assert!(message.contains("sum to 100"));
    }

    #[test]
    fn test_pve_wave_carries_loot() {
        let catalog = Catalog::builtin().expect("valid");
        let wave = catalog.pve_wave(4, RoundKind::LootPve);
        assert_eq!(wave.len(), 4);
        assert!(wave.iter().any(|u| !u.loot.is_empty()));
    }

    #[test]
    fn test_match_variables_are_seeded() {
        let catalog = Catalog::builtin().expect("valid");
        let a = catalog.roll_match_variables(&mut ChaCha8Rng::seed_from_u64(9));
        let b = catalog.roll_match_variables(&mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
        assert!(!a.blessing.is_empty());
    }
}
