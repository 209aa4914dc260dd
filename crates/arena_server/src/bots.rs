//! Scripted players for headless matches and load tests.
//!
//! A bot looks at its [`RoomView`], picks one action, and repeats until it
//! has nothing left to do, then readies. It buys the most expensive offer
//! it can afford, fills the board front row first, and takes a random
//! crest when one is offered.

use arena_core::hex::{HexCoord, BOARD_WIDTH, HALF_HEIGHT};
use arena_core::room::{Phase, PlayerAction, RoomView};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::room_task::RoomHandle;

/// Upper bound on actions per planning phase.
const MAX_ACTIONS_PER_PHASE: usize = 32;

/// Gold a bot keeps before it spends on XP.
const XP_RESERVE: u32 = 20;

/// A scripted player.
#[derive(Debug, Clone)]
pub struct Bot {
    player_id: String,
    rng: ChaCha8Rng,
}

impl Bot {
    /// Bot playing as `player_id`.
    #[must_use]
    pub fn new(player_id: impl Into<String>, seed: u64) -> Self {
        Self {
            player_id: player_id.into(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Player id.
    #[must_use]
    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    /// Next thing to do given the current view.
    pub fn next_action(&mut self, view: &RoomView) -> PlayerAction {
        let you = &view.you;

        if you.crest.is_none() && !you.crest_offers.is_empty() {
            let index = self.rng.gen_range(0..you.crest_offers.len());
            return PlayerAction::SelectCrest { index };
        }

        if you.roster.board.len() < usize::from(you.level) {
            let bench_slot = you.roster.bench.iter().position(Option::is_some);
            if let (Some(bench_slot), Some(cell)) = (bench_slot, free_cell(view)) {
                return PlayerAction::PlaceUnit {
                    bench_slot,
                    x: cell.x,
                    y: cell.y,
                };
            }
        }

        if you.roster.free_bench_slot().is_some() {
            let best = you
                .shop
                .iter()
                .enumerate()
                .filter_map(|(i, offer)| offer.as_ref().map(|o| (i, o.cost)))
                .filter(|&(_, cost)| cost <= you.gold)
                .max_by_key(|&(i, cost)| (cost, std::cmp::Reverse(i)));
            if let Some((shop_index, _)) = best {
                return PlayerAction::BuyUnit { shop_index };
            }
        }

        if you.gold >= XP_RESERVE {
            return PlayerAction::BuyXp;
        }
        PlayerAction::Ready
    }

    /// Act until ready. Refused actions end the turn early.
    pub async fn play_planning(&mut self, room: &RoomHandle) -> Result<()> {
        for _ in 0..MAX_ACTIONS_PER_PHASE {
            let Some(view) = room.view(&self.player_id).await? else {
                return Ok(());
            };
            if view.phase != Phase::Planning || view.you.ready || view.you.eliminated {
                return Ok(());
            }
            let action = self.next_action(&view);
            if action == PlayerAction::Ready {
                break;
            }
            match room.act(&self.player_id, action.clone()).await {
                Ok(()) => {}
                Err(ServerError::Action(err)) => {
                    debug!(bot = %self.player_id, ?action, %err, "Bot action refused");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        match room.act(&self.player_id, PlayerAction::Ready).await {
            Ok(()) | Err(ServerError::Action(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// First empty local cell, front row first.
fn free_cell(view: &RoomView) -> Option<HexCoord> {
    (0..HALF_HEIGHT)
        .flat_map(|y| (0..BOARD_WIDTH).map(move |x| HexCoord::new(x, y)))
        .find(|&cell| view.you.roster.board_unit(cell).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::room::RoundKind;
    use arena_core::roster::RosterUnit;
    use arena_core::shop::ShopOffer;
    use arena_test_utils::fixtures::room;

    fn view() -> RoomView {
        let mut room = room(2, 3);
        room.start_game().expect("two players");
        let mut view = room.view_for("p0").expect("joined");
        view.you.roster.bench.iter_mut().for_each(|slot| *slot = None);
        view.you.roster.board.clear();
        view
    }

    #[test]
    fn test_buys_most_expensive_affordable_offer() {
        let mut view = view();
        view.you.gold = 3;
        view.you.shop = vec![
            Some(ShopOffer {
                template: "knight".to_string(),
                cost: 1,
            }),
            Some(ShopOffer {
                template: "archer".to_string(),
                cost: 4,
            }),
            None,
            Some(ShopOffer {
                template: "brute".to_string(),
                cost: 2,
            }),
        ];
        let mut bot = Bot::new("p0", 1);
        assert_eq!(bot.next_action(&view), PlayerAction::BuyUnit { shop_index: 3 });
    }

    #[test]
    fn test_places_bench_unit_in_front_row() {
        let mut view = view();
        view.you.roster.bench[2] = Some(RosterUnit::new(1, "knight"));
        let mut bot = Bot::new("p0", 1);
        assert_eq!(
            bot.next_action(&view),
            PlayerAction::PlaceUnit {
                bench_slot: 2,
                x: 0,
                y: 0
            }
        );
    }

    #[test]
    fn test_picks_offered_crest() {
        let mut view = view();
        view.kind = RoundKind::Pvp;
        view.you.crest_offers = vec!["iron_will".to_string(), "swiftness".to_string()];
        let mut bot = Bot::new("p0", 9);
        match bot.next_action(&view) {
            PlayerAction::SelectCrest { index } => assert!(index < 2),
            other => panic!("expected crest pick, got {other:?}"),
        }
    }

    #[test]
    fn test_readies_when_broke() {
        let mut view = view();
        view.you.gold = 0;
        let mut bot = Bot::new("p0", 1);
        assert_eq!(bot.next_action(&view), PlayerAction::Ready);
    }
}
