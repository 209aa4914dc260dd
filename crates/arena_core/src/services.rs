//! Collaborator seams.
//!
//! The room never reads static data or mutates shops itself. Unit stats,
//! traits, items, crests and PvE waves come from a [`StatProvider`]; gold,
//! XP and shop mutations go through an [`Economy`]. The reference
//! implementations are [`crate::catalog::Catalog`] and
//! [`crate::shop::BasicEconomy`].
//!
//! Bonus application order is fixed here, not by the provider:
//! trait, then item, then crest.

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::ability::Ability;
use crate::error::ActionError;
use crate::hex::HexCoord;
use crate::passives::UnitPassives;
use crate::room::{PlayerState, RoundKind};
use crate::roster::{BoardUnit, RosterUnit, Slot};
use crate::shop::UnitPool;
use crate::simulation::{CombatTeam, MatchVariables, TeamModifiers};
use crate::stats::{StatGrant, UnitStats};
use crate::unit::UnitSpec;

/// A trait active on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitActivation {
    /// Trait id.
    pub trait_id: String,
    /// Distinct templates on the board carrying the trait.
    pub count: u32,
    /// Index of the reached tier.
    pub tier: usize,
    /// Grants for affected units.
    pub grants: Vec<StatGrant>,
    /// Passives for affected units.
    pub passives: UnitPassives,
    /// Team modifiers contributed.
    pub modifiers: TeamModifiers,
    /// Applies to every unit, not only trait members.
    pub team_wide: bool,
}

/// Static data and stat rules.
pub trait StatProvider: Send + Sync {
    /// Stats for a template at a star level.
    fn base_stats(&self, template: &str, star: u8) -> Option<UnitStats>;

    /// Ability cast by a template, if it has one.
    fn ability(&self, template: &str) -> Option<Ability>;

    /// Innate passives of a template.
    fn unit_passives(&self, template: &str) -> UnitPassives {
        let _ = template;
        UnitPassives::default()
    }

    /// Trait tags of a template.
    fn unit_traits(&self, template: &str) -> Vec<String>;

    /// Traits reached by a board.
    fn trait_activations(&self, board: &[BoardUnit]) -> Vec<TraitActivation>;

    /// Apply trait bonuses to one unit.
    fn apply_trait_bonuses(&self, unit: &mut UnitSpec, activations: &[TraitActivation]) {
        for activation in activations {
            if activation.team_wide || unit.traits.contains(&activation.trait_id) {
                unit.stats.apply_grants(&activation.grants);
                unit.passives.merge(&activation.passives);
            }
        }
    }

    /// Apply the unit's item bonuses.
    fn apply_item_bonuses(&self, unit: &mut UnitSpec, items: &[String]);

    /// Apply the owner's crest bonus.
    fn apply_crest_bonuses(&self, unit: &mut UnitSpec, crest: Option<&str>);

    /// Team modifiers from traits and crest.
    fn team_modifiers(&self, activations: &[TraitActivation], crest: Option<&str>)
        -> TeamModifiers;

    /// Roll the per-match variables.
    fn roll_match_variables(&self, rng: &mut ChaCha8Rng) -> MatchVariables;

    /// Hostile roster for a PvE round, in local positions.
    fn pve_wave(&self, round: u32, kind: RoundKind) -> Vec<UnitSpec>;

    /// Crests offered in a crest draft.
    fn crest_offers(&self, rng: &mut ChaCha8Rng, count: usize) -> Vec<String>;

    /// Items offered in a merchant round.
    fn merchant_items(&self, rng: &mut ChaCha8Rng, count: usize) -> Vec<String>;

    /// Whether an item id exists.
    fn is_known_item(&self, item: &str) -> bool;

    /// Whether a template exists.
    fn is_known_unit(&self, template: &str) -> bool {
        self.base_stats(template, 1).is_some()
    }
}

/// Gold, XP and shop rules.
pub trait Economy: Send + Sync {
    /// Fresh room-scoped unit pool.
    fn initial_pool(&self) -> UnitPool;

    /// Gold granted at planning start.
    fn income(&self, player: &PlayerState) -> u32;

    /// XP granted at planning start.
    fn passive_xp(&self) -> u32;

    /// Add XP, levelling up as thresholds are crossed.
    fn grant_xp(&self, player: &mut PlayerState, xp: u32);

    /// Board size allowed at a level.
    fn board_limit(&self, level: u8) -> usize;

    /// Return unsold offers to the pool and roll new ones.
    fn refresh_shop(&self, player: &mut PlayerState, pool: &mut UnitPool, rng: &mut ChaCha8Rng);

    /// Buy the offer at `index` onto the bench.
    ///
    /// # Errors
    ///
    /// `InvalidShopIndex`, `InsufficientGold` or `BenchFull`.
    fn buy_unit(&self, player: &mut PlayerState, index: usize) -> Result<(), ActionError>;

    /// Sell the unit in `slot`, returning its copies to the pool. Returns gold earned.
    ///
    /// # Errors
    ///
    /// `InvalidSlot` if the slot is empty.
    fn sell_unit(
        &self,
        player: &mut PlayerState,
        pool: &mut UnitPool,
        slot: Slot,
    ) -> Result<u32, ActionError>;

    /// Pay for a new set of offers.
    ///
    /// # Errors
    ///
    /// `InsufficientGold`.
    fn reroll(
        &self,
        player: &mut PlayerState,
        pool: &mut UnitPool,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), ActionError>;

    /// Pay gold for XP.
    ///
    /// # Errors
    ///
    /// `MaxLevel` or `InsufficientGold`.
    fn buy_xp(&self, player: &mut PlayerState) -> Result<(), ActionError>;

    /// Move an inventory item onto the unit in `slot`.
    ///
    /// # Errors
    ///
    /// `InvalidItem`, `InvalidSlot` or `ItemSlotsFull`.
    fn equip_item(
        &self,
        player: &mut PlayerState,
        item_index: usize,
        slot: Slot,
    ) -> Result<(), ActionError>;

    /// Put a unit's copies back into the pool.
    fn return_to_pool(&self, pool: &mut UnitPool, unit: &RosterUnit);
}

/// Resolve one roster unit into a combat spec: base stats, then trait,
/// item and crest bonuses.
pub fn resolve_unit(
    provider: &dyn StatProvider,
    unit: &RosterUnit,
    position: HexCoord,
    activations: &[TraitActivation],
    crest: Option<&str>,
) -> UnitSpec {
    let stats = provider
        .base_stats(&unit.template, unit.star)
        .unwrap_or_else(|| {
            tracing::warn!(template = %unit.template, star = unit.star, "Missing stats, using defaults");
            UnitStats::default()
        });
    let mut spec = UnitSpec {
        instance_id: unit.instance_id,
        template: unit.template.clone(),
        star: unit.star,
        position,
        stats,
        ability: provider.ability(&unit.template),
        passives: provider.unit_passives(&unit.template),
        traits: provider.unit_traits(&unit.template),
        loot: Vec::new(),
    };
    provider.apply_trait_bonuses(&mut spec, activations);
    provider.apply_item_bonuses(&mut spec, &unit.items);
    provider.apply_crest_bonuses(&mut spec, crest);
    spec
}

/// Build a player's combat team from their board.
pub fn build_team(
    provider: &dyn StatProvider,
    owner: &str,
    board: &[BoardUnit],
    crest: Option<&str>,
) -> CombatTeam {
    let activations = provider.trait_activations(board);
    let units = board
        .iter()
        .map(|b| resolve_unit(provider, &b.unit, b.position, &activations, crest))
        .collect();
    CombatTeam {
        owner: owner.to_string(),
        units,
        modifiers: provider.team_modifiers(&activations, crest),
    }
}
