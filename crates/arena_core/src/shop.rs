//! Reference economy: unit pool, shop rolls, gold and XP.
//!
//! The pool is room-scoped. Offers are taken out of the pool when rolled
//! and put back when they are replaced, so the copies on offer plus the
//! copies owned plus the copies in the pool always add up to the starting
//! pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::ActionError;
use crate::room::PlayerState;
use crate::roster::{RosterUnit, Slot, MAX_ITEMS};
use crate::services::Economy;

/// Remaining copies per template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitPool {
    copies: BTreeMap<String, u32>,
}

impl UnitPool {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies left of a template.
    #[must_use]
    pub fn remaining(&self, template: &str) -> u32 {
        self.copies.get(template).copied().unwrap_or(0)
    }

    /// Total copies across templates.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.copies.values().sum()
    }

    /// Take one copy. Returns `false` if none are left.
    pub fn take(&mut self, template: &str) -> bool {
        match self.copies.get_mut(template) {
            Some(count) if *count > 0 => {
                *count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Return copies.
    pub fn put(&mut self, template: &str, copies: u32) {
        *self.copies.entry(template.to_string()).or_insert(0) += copies;
    }
}

/// A unit for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopOffer {
    /// Template id.
    pub template: String,
    /// Price in gold.
    pub cost: u32,
}

/// Tunables for [`BasicEconomy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// Offers per shop roll.
    pub shop_size: usize,
    /// Gold per reroll.
    pub reroll_cost: u32,
    /// Gold per XP purchase.
    pub xp_cost: u32,
    /// XP per purchase.
    pub xp_per_purchase: u32,
    /// XP granted every planning phase.
    pub passive_xp: u32,
    /// Base income.
    pub base_income: u32,
    /// Gold per interest point.
    pub interest_step: u32,
    /// Interest cap.
    pub max_interest: u32,
    /// XP needed to leave each level, starting at level 1. Its length sets the max level.
    pub level_thresholds: Vec<u32>,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            shop_size: 5,
            reroll_cost: 2,
            xp_cost: 4,
            xp_per_purchase: 4,
            passive_xp: 2,
            base_income: 5,
            interest_step: 10,
            max_interest: 5,
            level_thresholds: vec![2, 6, 10, 20, 36, 56, 80],
        }
    }
}

impl EconomyConfig {
    /// Highest reachable level.
    #[must_use]
    pub fn max_level(&self) -> u8 {
        (self.level_thresholds.len() + 1).min(usize::from(u8::MAX)) as u8
    }
}

/// Bonus gold for a win or loss streak.
#[must_use]
pub fn streak_bonus(streak: i32) -> u32 {
    match streak.unsigned_abs() {
        0..=1 => 0,
        2 => 1,
        3..=4 => 2,
        _ => 3,
    }
}

/// Catalog-backed [`Economy`].
#[derive(Debug, Clone)]
pub struct BasicEconomy {
    catalog: Arc<Catalog>,
    config: EconomyConfig,
}

impl BasicEconomy {
    /// Economy over `catalog`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, config: EconomyConfig) -> Self {
        Self { catalog, config }
    }

    /// Tunables.
    #[must_use]
    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    fn roll_offer(&self, level: u8, pool: &mut UnitPool, rng: &mut ChaCha8Rng) -> Option<ShopOffer> {
        let odds = self.catalog.data().shop_odds.get(usize::from(level.max(1)) - 1)?;
        let mut roll = rng.gen_range(0..100);
        let tier = odds.iter().position(|&pct| {
            if roll < pct {
                true
            } else {
                roll -= pct;
                false
            }
        })?;
        let cost = tier as u32 + 1;

        // Weighted by remaining copies so drained templates show up less.
        let candidates: Vec<(&str, u32)> = self
            .catalog
            .units_of_cost(cost)
            .map(|u| (u.id.as_str(), pool.remaining(&u.id)))
            .filter(|&(_, left)| left > 0)
            .collect();
        let total: u32 = candidates.iter().map(|&(_, left)| left).sum();
        if total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        let template = candidates.iter().find_map(|&(id, left)| {
            if pick < left {
                Some(id)
            } else {
                pick -= left;
                None
            }
        })?;
        let template = template.to_string();
        pool.take(&template);
        Some(ShopOffer { template, cost })
    }

    fn return_offers(&self, player: &mut PlayerState, pool: &mut UnitPool) {
        for offer in player.shop.drain(..).flatten() {
            pool.put(&offer.template, 1);
        }
    }

    fn sell_price(&self, unit: &RosterUnit) -> u32 {
        let cost = self.catalog.unit_cost(&unit.template).unwrap_or(1);
        // A merged unit refunds one gold less than its copies cost.
        (cost * unit.copies()).saturating_sub(u32::from(unit.star > 1))
    }
}

impl Economy for BasicEconomy {
    fn initial_pool(&self) -> UnitPool {
        let mut pool = UnitPool::new();
        for unit in &self.catalog.data().units {
            let Some(cost) = self.catalog.unit_cost(&unit.id) else {
                continue;
            };
            let copies = self
                .catalog
                .data()
                .pool_sizes
                .get(cost as usize - 1)
                .copied()
                .unwrap_or(0);
            pool.put(&unit.id, copies);
        }
        pool
    }

    fn income(&self, player: &PlayerState) -> u32 {
        let interest = (player.gold / self.config.interest_step.max(1)).min(self.config.max_interest);
        self.config.base_income + interest + streak_bonus(player.streak)
    }

    fn passive_xp(&self) -> u32 {
        self.config.passive_xp
    }

    fn grant_xp(&self, player: &mut PlayerState, xp: u32) {
        if player.level >= self.config.max_level() {
            return;
        }
        player.xp += xp;
        while let Some(&needed) = self
            .config
            .level_thresholds
            .get(usize::from(player.level.max(1)) - 1)
        {
            if player.xp < needed {
                break;
            }
            player.xp -= needed;
            player.level += 1;
            tracing::debug!(player = %player.id, level = player.level, "Level up");
        }
        if player.level >= self.config.max_level() {
            player.xp = 0;
        }
    }

    fn board_limit(&self, level: u8) -> usize {
        usize::from(level.max(1))
    }

    fn refresh_shop(&self, player: &mut PlayerState, pool: &mut UnitPool, rng: &mut ChaCha8Rng) {
        self.return_offers(player, pool);
        player.shop = (0..self.config.shop_size)
            .map(|_| self.roll_offer(player.level, pool, rng))
            .collect();
    }

    fn buy_unit(&self, player: &mut PlayerState, index: usize) -> Result<(), ActionError> {
        let offer = player
            .shop
            .get(index)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or(ActionError::InvalidShopIndex(index))?;
        if player.gold < offer.cost {
            return Err(ActionError::InsufficientGold {
                required: offer.cost,
                available: player.gold,
            });
        }
        let id = player.roster.next_instance_id();
        player
            .roster
            .add_to_bench(RosterUnit::new(id, offer.template))?;
        player.gold -= offer.cost;
        player.shop[index] = None;
        Ok(())
    }

    fn sell_unit(
        &self,
        player: &mut PlayerState,
        pool: &mut UnitPool,
        slot: Slot,
    ) -> Result<u32, ActionError> {
        let mut unit = player.roster.take(slot)?;
        let price = self.sell_price(&unit);
        player.items.append(&mut unit.items);
        self.return_to_pool(pool, &unit);
        player.gold += price;
        Ok(price)
    }

    fn reroll(
        &self,
        player: &mut PlayerState,
        pool: &mut UnitPool,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), ActionError> {
        if player.gold < self.config.reroll_cost {
            return Err(ActionError::InsufficientGold {
                required: self.config.reroll_cost,
                available: player.gold,
            });
        }
        player.gold -= self.config.reroll_cost;
        self.refresh_shop(player, pool, rng);
        Ok(())
    }

    fn buy_xp(&self, player: &mut PlayerState) -> Result<(), ActionError> {
        if player.level >= self.config.max_level() {
            return Err(ActionError::MaxLevel);
        }
        if player.gold < self.config.xp_cost {
            return Err(ActionError::InsufficientGold {
                required: self.config.xp_cost,
                available: player.gold,
            });
        }
        player.gold -= self.config.xp_cost;
        self.grant_xp(player, self.config.xp_per_purchase);
        Ok(())
    }

    fn equip_item(
        &self,
        player: &mut PlayerState,
        item_index: usize,
        slot: Slot,
    ) -> Result<(), ActionError> {
        if item_index >= player.items.len() {
            return Err(ActionError::InvalidItem(item_index));
        }
        let unit = player.roster.unit_mut(slot)?;
        if unit.items.len() >= MAX_ITEMS {
            return Err(ActionError::ItemSlotsFull);
        }
        let item = player.items.remove(item_index);
        unit.items.push(item);
        Ok(())
    }

    fn return_to_pool(&self, pool: &mut UnitPool, unit: &RosterUnit) {
        if self.catalog.unit_cost(&unit.template).is_some() {
            pool.put(&unit.template, unit.copies());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn economy() -> BasicEconomy {
        let catalog = Arc::new(Catalog::builtin().expect("valid catalog"));
        BasicEconomy::new(catalog, EconomyConfig::default())
    }

    fn player(gold: u32) -> PlayerState {
        let mut player = PlayerState::new("p1", "Player 1", 100);
        player.gold = gold;
        player
    }

    #[test]
    fn test_income_formula() {
        let economy = economy();
        let mut p = player(0);
        assert_eq!(economy.income(&p), 5);
        p.gold = 37;
        assert_eq!(economy.income(&p), 8);
        p.gold = 90;
        p.streak = -3;
        assert_eq!(economy.income(&p), 5 + 5 + 2);
    }

    #[test]
    fn test_refresh_conserves_pool() {
        let economy = economy();
        let mut pool = economy.initial_pool();
        let total = pool.total();
        let mut p = player(0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        economy.refresh_shop(&mut p, &mut pool, &mut rng);
        let on_offer = p.shop.iter().flatten().count() as u32;
        assert_eq!(on_offer, 5);
        assert_eq!(pool.total() + on_offer, total);
        // Level 1 only rolls one-cost units.
        assert!(p.shop.iter().flatten().all(|o| o.cost == 1));

        economy.refresh_shop(&mut p, &mut pool, &mut rng);
        assert_eq!(pool.total() + 5, total);
    }

    #[test]
    fn test_buy_and_sell() {
        let economy = economy();
        let mut pool = economy.initial_pool();
        let mut p = player(1);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        economy.refresh_shop(&mut p, &mut pool, &mut rng);
        let before = pool.total();

        economy.buy_unit(&mut p, 0).expect("affordable");
        assert_eq!(p.gold, 0);
        assert!(p.shop[0].is_none());
        assert_eq!(
            economy.buy_unit(&mut p, 0),
            Err(ActionError::InvalidShopIndex(0))
        );
        assert_eq!(
            economy.buy_unit(&mut p, 1),
            Err(ActionError::InsufficientGold {
                required: 1,
                available: 0
            })
        );

        let price = economy
            .sell_unit(&mut p, &mut pool, Slot::Bench(0))
            .expect("unit on bench");
        assert_eq!(price, 1);
        assert_eq!(pool.total(), before + 1);
    }

    #[test]
    fn test_buy_xp_levels_up() {
        let economy = economy();
        let mut p = player(8);
        economy.buy_xp(&mut p).expect("affordable");
        // 4 XP: level 1 -> 2 costs 2, 2 carried.
        assert_eq!(p.level, 2);
        assert_eq!(p.xp, 2);
        economy.buy_xp(&mut p).expect("affordable");
        assert_eq!(p.level, 3);
        assert_eq!(p.xp, 0);
        assert!(matches!(
            economy.buy_xp(&mut p),
            Err(ActionError::InsufficientGold { .. })
        ));
    }

    #[test]
    fn test_equip_item() {
        let economy = economy();
        let mut p = player(0);
        let id = p.roster.next_instance_id();
        p.roster.add_to_bench(RosterUnit::new(id, "knight")).expect("room");
        p.items = vec!["long_sword".into(); 4];
        for _ in 0..MAX_ITEMS {
            economy.equip_item(&mut p, 0, Slot::Bench(0)).expect("slot free");
        }
        assert_eq!(
            economy.equip_item(&mut p, 0, Slot::Bench(0)),
            Err(ActionError::ItemSlotsFull)
        );
        assert_eq!(
            economy.equip_item(&mut p, 5, Slot::Bench(0)),
            Err(ActionError::InvalidItem(5))
        );
        assert!(matches!(
            economy.equip_item(&mut p, 0, Slot::Bench(3)),
            Err(ActionError::InvalidSlot(_))
        ));
    }

    #[test]
    fn test_streak_bonus() {
        assert_eq!(streak_bonus(0), 0);
        assert_eq!(streak_bonus(2), 1);
        assert_eq!(streak_bonus(-4), 2);
        assert_eq!(streak_bonus(7), 3);
    }
}
