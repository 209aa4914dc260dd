//! Round and phase state machine for one room.
//!
//! A [`Room`] owns every player's state, the shared unit pool and the
//! room RNG. It never sleeps or spawns: transitions that wait on wall-clock
//! time are requested through [`RoomEvent::TimerRequested`] and completed by
//! the driver calling [`Room::on_timer`] with the generation it was given.
//! Every transition bumps the generation, so a timer that fires late is
//! recognised and dropped.
//!
//! ```text
//! Waiting -> Planning -> Combat -> Results -> Planning ...
//!                                        \-> GameOver
//! ```
//!
//! # Determinism
//!
//! All randomness (shops, matchups, combat seeds, drafts) is drawn from the
//! room's [`ChaCha8Rng`] in a fixed order and players are iterated by id,
//! so a room replays identically from its seed and the same action stream.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::events::{CombatEvent, CombatWinner};
use crate::hex::{HexCoord, Side};
use crate::matchup::{generate_matchups, HostHistory, Matchup, Opponent};
use crate::roster::{BoardUnit, Roster, RosterUnit, Slot, MAX_STAR};
use crate::services::{build_team, Economy, StatProvider};
use crate::shop::{ShopOffer, UnitPool};
use crate::simulation::{CombatResult, CombatSimulator, CombatTeam, MatchVariables, SimConfig};
use crate::unit::LootTag;

/// Gold granted in place of loot that cannot be delivered.
const FALLBACK_LOOT_GOLD: u32 = 1;

/// Room lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Lobby; players may join.
    Waiting,
    /// Players build their boards.
    Planning,
    /// Combats resolved; clients replay them.
    Combat,
    /// Outcomes shown.
    Results,
    /// Match over.
    GameOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Waiting => "waiting",
            Phase::Planning => "planning",
            Phase::Combat => "combat",
            Phase::Results => "results",
            Phase::GameOver => "game over",
        };
        f.write_str(name)
    }
}

/// What the combat phase of a round does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundKind {
    /// Opening wave against every player.
    IntroPve,
    /// Player against player.
    Pvp,
    /// Wave whose units drop loot.
    LootPve,
    /// Non-combat item pick.
    Merchant,
    /// Non-combat crest draft.
    CrestDraft,
    /// Boss wave.
    BossPve,
}

impl RoundKind {
    /// Kind of a 1-based round. Rounds past the schedule are PvP.
    #[must_use]
    pub const fn for_round(round: u32) -> Self {
        match round {
            1 => RoundKind::IntroPve,
            4 | 10 => RoundKind::LootPve,
            7 => RoundKind::CrestDraft,
            11 => RoundKind::Merchant,
            14 => RoundKind::BossPve,
            _ => RoundKind::Pvp,
        }
    }

    /// Every player fights a wave.
    #[must_use]
    pub const fn is_pve(self) -> bool {
        matches!(
            self,
            RoundKind::IntroPve | RoundKind::LootPve | RoundKind::BossPve
        )
    }

    /// The round runs simulations.
    #[must_use]
    pub const fn runs_combat(self) -> bool {
        !matches!(self, RoundKind::Merchant | RoundKind::CrestDraft)
    }
}

/// Room tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Players needed to start.
    pub min_players: usize,
    /// Room capacity.
    pub max_players: usize,
    /// Health each player starts with.
    pub starting_health: i32,
    /// Gold each player starts with, before round one income.
    pub starting_gold: u32,
    /// Planning time for combat rounds.
    pub planning_ms: u64,
    /// Planning time for merchant and crest rounds.
    pub draft_planning_ms: u64,
    /// Display time for merchant and crest picks.
    pub non_combat_ms: u64,
    /// Added to the longest replay.
    pub combat_padding_ms: u64,
    /// Results display time.
    pub results_ms: u64,
    /// Crests offered per player in a draft.
    pub crest_offer_count: usize,
    /// Simulator timing.
    pub sim: SimConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_players: 2,
            max_players: 4,
            starting_health: 100,
            starting_gold: 0,
            planning_ms: 30_000,
            draft_planning_ms: 15_000,
            non_combat_ms: 8_000,
            combat_padding_ms: 3_000,
            results_ms: 5_000,
            crest_offer_count: 3,
            sim: SimConfig::default(),
        }
    }
}

impl RoomConfig {
    /// Planning timer for a round kind.
    #[must_use]
    pub fn planning_duration(&self, kind: RoundKind) -> u64 {
        if kind.runs_combat() {
            self.planning_ms
        } else {
            self.draft_planning_ms
        }
    }
}

/// Timer purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Ends planning.
    Planning,
    /// Ends combat replay.
    Combat,
    /// Ends results display.
    Results,
}

/// Ask the driver to call [`Room::on_timer`] after `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRequest {
    /// Generation to hand back.
    pub generation: u64,
    /// Purpose.
    pub kind: TimerKind,
    /// Delay in milliseconds.
    pub duration_ms: u64,
}

/// A player command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlayerAction {
    /// Done planning.
    Ready,
    /// Move a bench unit onto a local board cell.
    PlaceUnit {
        /// Bench slot.
        bench_slot: usize,
        /// Column.
        x: i32,
        /// Local row.
        y: i32,
    },
    /// Move a board unit to the bench.
    BenchUnit {
        /// Column.
        x: i32,
        /// Local row.
        y: i32,
    },
    /// Sell a unit.
    SellUnit {
        /// Where it is.
        slot: Slot,
    },
    /// Buy a shop offer.
    BuyUnit {
        /// Offer index.
        shop_index: usize,
    },
    /// Pay for new offers.
    Reroll,
    /// Pay for XP.
    BuyXp,
    /// Equip an inventory item.
    EquipItem {
        /// Inventory index.
        item_index: usize,
        /// Unit to equip.
        slot: Slot,
    },
    /// Keep the current offers through the next refresh.
    ToggleShopLock,
    /// Take one of the offered crests.
    SelectCrest {
        /// Offer index.
        index: usize,
    },
}

/// Replay of one combat, shared with its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatReplay {
    /// The pairing.
    pub matchup: Matchup,
    /// Owner label of the home team.
    pub home_owner: String,
    /// Owner label of the away team.
    pub away_owner: String,
    /// Simulation seed.
    pub seed: u64,
    /// Winner.
    pub winner: CombatWinner,
    /// Damage dealt to the loser.
    pub damage: u32,
    /// Ticks simulated.
    pub duration_ticks: u32,
    /// Full event log.
    pub events: Vec<CombatEvent>,
}

/// Outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Entered a phase.
    PhaseChanged {
        /// New phase.
        phase: Phase,
        /// Current round.
        round: u32,
        /// Current round kind.
        kind: RoundKind,
    },
    /// Driver should arm a timer.
    TimerRequested(TimerRequest),
    /// Combats for the round were resolved.
    CombatStarted {
        /// Round.
        round: u32,
        /// Round kind.
        kind: RoundKind,
        /// One replay per matchup.
        replays: Vec<CombatReplay>,
    },
    /// Combat replay time is over.
    CombatEnded {
        /// Round.
        round: u32,
    },
    /// Results display is over.
    ResultsEnded {
        /// Round.
        round: u32,
    },
    /// A player is out.
    PlayerEliminated {
        /// Player id.
        player: String,
        /// Round of elimination.
        round: u32,
    },
    /// Merchant picks, in pick order.
    MerchantRound {
        /// Player ids in pick order.
        order: Vec<String>,
        /// Item taken by the player at the same index.
        offers: Vec<String>,
    },
    /// Crests on offer for a player.
    CrestOffers {
        /// Player id.
        player: String,
        /// Crest ids.
        offers: Vec<String>,
    },
    /// Match over.
    GameOver {
        /// Last player standing.
        winner: Option<String>,
    },
}

/// Everything the room tracks for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Player id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Health; at zero or below the player is eliminated.
    pub health: i32,
    /// Gold.
    pub gold: u32,
    /// Level; also the board size.
    pub level: u8,
    /// XP toward the next level.
    pub xp: u32,
    /// Positive for wins in a row, negative for losses.
    pub streak: i32,
    /// Ready to leave planning.
    pub ready: bool,
    /// Out of the match.
    pub eliminated: bool,
    /// Round the player was eliminated in.
    pub eliminated_round: Option<u32>,
    /// Left the room.
    pub left: bool,
    /// Board and bench.
    pub roster: Roster,
    /// Shop offers; `None` for bought slots.
    pub shop: Vec<Option<ShopOffer>>,
    /// Keep offers through the next refresh.
    pub shop_locked: bool,
    /// Unequipped items.
    pub items: Vec<String>,
    /// Selected crest.
    pub crest: Option<String>,
    /// Crests on offer.
    pub crest_offers: Vec<String>,
    /// Units won that did not fit yet.
    pub deferred: Vec<RosterUnit>,
    /// Loot to deliver at the next planning phase.
    pub queued_loot: Vec<LootTag>,
}

impl PlayerState {
    /// Fresh level-one player.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, health: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            health,
            gold: 0,
            level: 1,
            xp: 0,
            streak: 0,
            ready: false,
            eliminated: false,
            eliminated_round: None,
            left: false,
            roster: Roster::new(),
            shop: Vec::new(),
            shop_locked: false,
            items: Vec::new(),
            crest: None,
            crest_offers: Vec::new(),
            deferred: Vec::new(),
            queued_loot: Vec::new(),
        }
    }
}

/// What other players can see of a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicPlayer {
    /// Player id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Health.
    pub health: i32,
    /// Level.
    pub level: u8,
    /// Streak.
    pub streak: i32,
    /// Eliminated.
    pub eliminated: bool,
    /// Board.
    pub board: Vec<BoardUnit>,
    /// Selected crest.
    pub crest: Option<String>,
}

impl From<&PlayerState> for PublicPlayer {
    fn from(p: &PlayerState) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            health: p.health,
            level: p.level,
            streak: p.streak,
            eliminated: p.eliminated,
            board: p.roster.board.clone(),
            crest: p.crest.clone(),
        }
    }
}

/// Per-player room view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomView {
    /// Room id.
    pub room_id: String,
    /// Phase.
    pub phase: Phase,
    /// Round.
    pub round: u32,
    /// Round kind.
    pub kind: RoundKind,
    /// Generation.
    pub generation: u64,
    /// The viewer's full state.
    pub you: PlayerState,
    /// Everyone else, without shops or inventories.
    pub others: Vec<PublicPlayer>,
}

struct CombatJob {
    matchup: Matchup,
    seed: u64,
    home: CombatTeam,
    away: CombatTeam,
}

struct Fought {
    matchup: Matchup,
    seed: u64,
    home_owner: String,
    away_owner: String,
    result: CombatResult,
}

/// One match.
pub struct Room {
    id: String,
    config: RoomConfig,
    phase: Phase,
    round: u32,
    generation: u64,
    players: BTreeMap<String, PlayerState>,
    pool: UnitPool,
    history: HostHistory,
    rng: ChaCha8Rng,
    vars: MatchVariables,
    events: Vec<RoomEvent>,
    winner: Option<String>,
    stats: Arc<dyn StatProvider>,
    economy: Arc<dyn Economy>,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("round", &self.round)
            .field("generation", &self.generation)
            .field("players", &self.players.len())
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Create an empty room in [`Phase::Waiting`].
    pub fn new(
        id: impl Into<String>,
        config: RoomConfig,
        stats: Arc<dyn StatProvider>,
        economy: Arc<dyn Economy>,
        seed: u64,
    ) -> Self {
        let pool = economy.initial_pool();
        Self {
            id: id.into(),
            config,
            phase: Phase::Waiting,
            round: 0,
            generation: 0,
            players: BTreeMap::new(),
            pool,
            history: HostHistory::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            vars: MatchVariables::default(),
            events: Vec::new(),
            winner: None,
            stats,
            economy,
        }
    }

    /// Room id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current round, 0 before the match starts.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    /// Kind of the current round.
    #[must_use]
    pub const fn round_kind(&self) -> RoundKind {
        RoundKind::for_round(self.round)
    }

    /// Current generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Tunables.
    #[must_use]
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Variables rolled for this match.
    #[must_use]
    pub fn match_variables(&self) -> &MatchVariables {
        &self.vars
    }

    /// Winner once the game is over.
    #[must_use]
    pub fn winner(&self) -> Option<&str> {
        self.winner.as_deref()
    }

    /// Remaining unit pool.
    #[must_use]
    pub fn pool(&self) -> &UnitPool {
        &self.pool
    }

    /// A player's state.
    #[must_use]
    pub fn player(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    /// Mutable player state, for scenario setup and tooling.
    pub fn player_mut(&mut self, id: &str) -> Option<&mut PlayerState> {
        self.players.get_mut(id)
    }

    /// Every player, by id.
    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    /// Ids of players still in the match, sorted.
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        self.players
            .values()
            .filter(|p| !p.eliminated)
            .map(|p| p.id.clone())
            .collect()
    }

    /// No one is left connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.values().all(|p| p.left)
    }

    /// Take queued notifications.
    pub fn drain_events(&mut self) -> Vec<RoomEvent> {
        std::mem::take(&mut self.events)
    }

    /// Join the lobby.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted`, `RoomFull` or `DuplicatePlayer`.
    pub fn add_player(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<(), ActionError> {
        let id = id.into();
        if self.phase != Phase::Waiting {
            return Err(ActionError::AlreadyStarted);
        }
        if self.players.len() >= self.config.max_players {
            return Err(ActionError::RoomFull(self.config.max_players));
        }
        if self.players.contains_key(&id) {
            return Err(ActionError::DuplicatePlayer(id));
        }
        let mut player = PlayerState::new(id.clone(), name, self.config.starting_health);
        player.gold = self.config.starting_gold;
        tracing::info!(room = %self.id, player = %id, "Player joined");
        self.players.insert(id, player);
        Ok(())
    }

    /// Leave the room. In the lobby the player is removed; mid-match they are
    /// eliminated and their units go back to the pool.
    ///
    /// # Errors
    ///
    /// `UnknownPlayer`.
    pub fn remove_player(&mut self, id: &str) -> Result<(), ActionError> {
        if !self.players.contains_key(id) {
            return Err(ActionError::UnknownPlayer(id.to_string()));
        }
        tracing::info!(room = %self.id, player = %id, phase = %self.phase, "Player left");
        if self.phase == Phase::Waiting {
            self.players.remove(id);
            return Ok(());
        }

        if let Some(player) = self.players.get_mut(id) {
            player.left = true;
        }
        if self.phase == Phase::GameOver {
            return Ok(());
        }
        self.eliminate(id);
        if self.active_ids().is_empty() {
            self.finish(None);
        } else if self.phase == Phase::Planning && self.all_ready() {
            self.enter_combat();
        }
        Ok(())
    }

    /// Leave the lobby and enter round one.
    ///
    /// # Errors
    ///
    /// `AlreadyStarted` or `NotEnoughPlayers`.
    pub fn start_game(&mut self) -> Result<(), ActionError> {
        if self.phase != Phase::Waiting {
            return Err(ActionError::AlreadyStarted);
        }
        if self.players.len() < self.config.min_players {
            return Err(ActionError::NotEnoughPlayers {
                required: self.config.min_players,
                available: self.players.len(),
            });
        }
        self.vars = self.stats.roll_match_variables(&mut self.rng);
        tracing::info!(
            room = %self.id,
            players = self.players.len(),
            element = ?self.vars.attuned_element,
            "Match started"
        );
        self.round = 1;
        self.enter_planning();
        Ok(())
    }

    /// A timer armed for `generation` expired. Returns whether it caused a
    /// transition; stale or mismatched timers are ignored.
    pub fn on_timer(&mut self, generation: u64, kind: TimerKind) -> bool {
        if generation != self.generation {
            tracing::trace!(room = %self.id, generation, current = self.generation, "Stale timer");
            return false;
        }
        match (self.phase, kind) {
            (Phase::Planning, TimerKind::Planning) => self.enter_combat(),
            (Phase::Combat, TimerKind::Combat) => {
                self.events.push(RoomEvent::CombatEnded { round: self.round });
                self.enter_results();
            }
            (Phase::Results, TimerKind::Results) => {
                self.events.push(RoomEvent::ResultsEnded { round: self.round });
                self.advance_round();
            }
            (phase, kind) => {
                tracing::trace!(room = %self.id, %phase, ?kind, "Timer does not match phase");
                return false;
            }
        }
        true
    }

    /// Apply a player command.
    ///
    /// The command runs against a copy of the player, pool and RNG that is
    /// committed only if it succeeds.
    ///
    /// # Errors
    ///
    /// The reason the command is illegal.
    pub fn handle_action(&mut self, player_id: &str, action: PlayerAction) -> Result<(), ActionError> {
        match self.phase {
            Phase::GameOver => return Err(ActionError::GameOver),
            Phase::Waiting => {
                return Err(ActionError::WrongPhase {
                    phase: self.phase.to_string(),
                })
            }
            _ => {}
        }
        let player = self
            .players
            .get(player_id)
            .ok_or_else(|| ActionError::UnknownPlayer(player_id.to_string()))?;
        if player.eliminated {
            return Err(ActionError::PlayerEliminated(player_id.to_string()));
        }

        let mut draft = player.clone();
        let mut pool = self.pool.clone();
        let mut rng = self.rng.clone();
        if let Err(err) = self.apply_action(&mut draft, &mut pool, &mut rng, &action) {
            tracing::debug!(room = %self.id, player = %player_id, ?action, %err, "Action rejected");
            return Err(err);
        }
        self.players.insert(player_id.to_string(), draft);
        self.pool = pool;
        self.rng = rng;

        if self.phase == Phase::Planning && self.all_ready() {
            tracing::debug!(room = %self.id, round = self.round, "Everyone ready");
            self.enter_combat();
        }
        Ok(())
    }

    /// Snapshot for one player, hiding other players' shops.
    #[must_use]
    pub fn view_for(&self, player_id: &str) -> Option<RoomView> {
        let you = self.players.get(player_id)?.clone();
        let others = self
            .players
            .values()
            .filter(|p| p.id != player_id)
            .map(PublicPlayer::from)
            .collect();
        Some(RoomView {
            room_id: self.id.clone(),
            phase: self.phase,
            round: self.round,
            kind: self.round_kind(),
            generation: self.generation,
            you,
            others,
        })
    }

    fn require_planning(&self) -> Result<(), ActionError> {
        if self.phase == Phase::Planning {
            Ok(())
        } else {
            Err(ActionError::WrongPhase {
                phase: self.phase.to_string(),
            })
        }
    }

    fn apply_action(
        &self,
        player: &mut PlayerState,
        pool: &mut UnitPool,
        rng: &mut ChaCha8Rng,
        action: &PlayerAction,
    ) -> Result<(), ActionError> {
        match *action {
            PlayerAction::Ready => {
                self.require_planning()?;
                player.ready = true;
            }
            PlayerAction::PlaceUnit { bench_slot, x, y } => {
                self.require_planning()?;
                let limit = self.economy.board_limit(player.level);
                player.roster.place(bench_slot, HexCoord::new(x, y), limit)?;
            }
            PlayerAction::BenchUnit { x, y } => {
                self.require_planning()?;
                player.roster.bench_unit(HexCoord::new(x, y))?;
            }
            PlayerAction::SellUnit { slot } => {
                if matches!(slot, Slot::Board(_)) {
                    self.require_planning()?;
                }
                self.economy.sell_unit(player, pool, slot)?;
            }
            PlayerAction::BuyUnit { shop_index } => {
                self.economy.buy_unit(player, shop_index)?;
                let report = player.roster.merge_all();
                for merge in &report.merges {
                    tracing::debug!(player = %player.id, template = %merge.template, star = merge.star, "Units merged");
                }
                player.items.extend(report.returned_items);
            }
            PlayerAction::Reroll => self.economy.reroll(player, pool, rng)?,
            PlayerAction::BuyXp => self.economy.buy_xp(player)?,
            PlayerAction::EquipItem { item_index, slot } => {
                self.economy.equip_item(player, item_index, slot)?;
            }
            PlayerAction::ToggleShopLock => player.shop_locked = !player.shop_locked,
            PlayerAction::SelectCrest { index } => {
                self.require_planning()?;
                if player.crest.is_some() {
                    return Err(ActionError::CrestAlreadySelected);
                }
                let crest = player
                    .crest_offers
                    .get(index)
                    .cloned()
                    .ok_or(ActionError::InvalidItem(index))?;
                player.crest = Some(crest);
                player.crest_offers.clear();
            }
        }
        Ok(())
    }

    fn all_ready(&self) -> bool {
        let mut active = self.players.values().filter(|p| !p.eliminated).peekable();
        active.peek().is_some() && active.all(|p| p.ready)
    }

    fn request_timer(&mut self, kind: TimerKind, duration_ms: u64) {
        self.events.push(RoomEvent::TimerRequested(TimerRequest {
            generation: self.generation,
            kind,
            duration_ms,
        }));
    }

    fn announce_phase(&mut self) {
        self.events.push(RoomEvent::PhaseChanged {
            phase: self.phase,
            round: self.round,
            kind: self.round_kind(),
        });
    }

    fn enter_planning(&mut self) {
        self.generation += 1;
        self.phase = Phase::Planning;
        let kind = self.round_kind();

        for player in self.players.values_mut().filter(|p| !p.eliminated) {
            deliver_loot(self.stats.as_ref(), player);

            let deferred = std::mem::take(&mut player.deferred);
            let report = player.roster.absorb(deferred);
            player.items.extend(report.returned_items);
            player.deferred = report.leftover;

            let income = self.economy.income(player);
            player.gold += income;
            self.economy.grant_xp(player, self.economy.passive_xp());
            if !player.shop_locked {
                self.economy.refresh_shop(player, &mut self.pool, &mut self.rng);
            }
            player.ready = false;
        }

        tracing::info!(room = %self.id, round = self.round, ?kind, "Planning");
        self.announce_phase();
        self.request_timer(TimerKind::Planning, self.config.planning_duration(kind));
    }

    fn enter_combat(&mut self) {
        self.generation += 1;
        self.phase = Phase::Combat;
        for player in self.players.values_mut() {
            player.ready = false;
        }

        let kind = self.round_kind();
        let replays = match kind {
            RoundKind::Pvp => {
                let jobs = self.pvp_jobs();
                self.fight(jobs)
            }
            RoundKind::IntroPve | RoundKind::LootPve | RoundKind::BossPve => {
                let jobs = self.pve_jobs(kind);
                self.fight(jobs)
            }
            RoundKind::Merchant => {
                self.run_merchant();
                Vec::new()
            }
            RoundKind::CrestDraft => {
                self.offer_crests();
                Vec::new()
            }
        };

        let duration_ms = if kind.runs_combat() {
            let tick_rate = u64::from(self.config.sim.tick_rate.max(1));
            let longest = replays
                .iter()
                .map(|r| u64::from(r.duration_ticks))
                .max()
                .unwrap_or(0);
            longest * 1000 / tick_rate + self.config.combat_padding_ms
        } else {
            self.config.non_combat_ms
        };

        tracing::info!(room = %self.id, round = self.round, ?kind, combats = replays.len(), "Combat");
        self.announce_phase();
        self.events.push(RoomEvent::CombatStarted {
            round: self.round,
            kind,
            replays,
        });
        self.eliminate_defeated();
        self.request_timer(TimerKind::Combat, duration_ms);
    }

    fn enter_results(&mut self) {
        self.generation += 1;
        self.phase = Phase::Results;
        self.announce_phase();
        self.request_timer(TimerKind::Results, self.config.results_ms);
    }

    fn advance_round(&mut self) {
        let active = self.active_ids();
        if active.len() <= 1 {
            self.finish(active.into_iter().next());
            return;
        }
        self.round += 1;
        self.enter_planning();
    }

    fn finish(&mut self, winner: Option<String>) {
        self.generation += 1;
        self.phase = Phase::GameOver;
        tracing::info!(room = %self.id, round = self.round, winner = ?winner, "Match over");
        self.winner.clone_from(&winner);
        self.announce_phase();
        self.events.push(RoomEvent::GameOver { winner });
    }

    fn team_for(&self, player_id: &str, owner: &str) -> CombatTeam {
        match self.players.get(player_id) {
            Some(p) => build_team(self.stats.as_ref(), owner, &p.roster.board, p.crest.as_deref()),
            None => CombatTeam::new(owner, Vec::new()),
        }
    }

    fn pvp_jobs(&mut self) -> Vec<CombatJob> {
        let active = self.active_ids();
        let matchups = generate_matchups(&active, &mut self.history, &mut self.rng);
        let mut jobs = Vec::with_capacity(matchups.len());
        for matchup in matchups {
            let seed = self.rng.gen();
            let (home, away) = match &matchup.opponent {
                Opponent::Player(other) => {
                    let visitor = if matchup.host == matchup.player {
                        other.as_str()
                    } else {
                        matchup.player.as_str()
                    };
                    (
                        self.team_for(&matchup.host, &matchup.host),
                        self.team_for(visitor, visitor),
                    )
                }
                Opponent::Ghost(copy) => (
                    self.team_for(&matchup.player, &matchup.player),
                    self.team_for(copy, &format!("ghost:{copy}")),
                ),
                Opponent::Pve => continue,
            };
            jobs.push(CombatJob {
                matchup,
                seed,
                home,
                away,
            });
        }
        jobs
    }

    fn pve_jobs(&mut self, kind: RoundKind) -> Vec<CombatJob> {
        let mut jobs = Vec::new();
        for id in self.active_ids() {
            let seed = self.rng.gen();
            let wave = self.stats.pve_wave(self.round, kind);
            jobs.push(CombatJob {
                matchup: Matchup {
                    player: id.clone(),
                    opponent: Opponent::Pve,
                    host: id.clone(),
                },
                seed,
                home: self.team_for(&id, &id),
                away: CombatTeam::new("pve", wave),
            });
        }
        jobs
    }

    fn fight(&mut self, jobs: Vec<CombatJob>) -> Vec<CombatReplay> {
        let vars = &self.vars;
        let config = self.config.sim;
        let fought: Vec<Fought> = jobs
            .into_par_iter()
            .map(|job| {
                let home_owner = job.home.owner.clone();
                let away_owner = job.away.owner.clone();
                let result =
                    CombatSimulator::new(job.home, job.away, vars.clone(), config, job.seed).run();
                Fought {
                    matchup: job.matchup,
                    seed: job.seed,
                    home_owner,
                    away_owner,
                    result,
                }
            })
            .collect();
        fought.into_iter().map(|f| self.settle(f)).collect()
    }

    fn settle(&mut self, fought: Fought) -> CombatReplay {
        let Fought {
            matchup,
            seed,
            home_owner,
            away_owner,
            result,
        } = fought;

        // Only real players receive loot and outcomes.
        let away_player = matches!(matchup.opponent, Opponent::Player(_)).then(|| away_owner.clone());
        let sides = [
            (Side::Home, Some(home_owner.clone())),
            (Side::Away, away_player),
        ];
        for (side, owner) in &sides {
            let Some(owner) = owner else { continue };
            if let Some(player) = self.players.get_mut(owner) {
                player.queued_loot.extend(result.loot_for(*side).cloned());
            }
        }

        if !matchup.is_ghost() {
            if let Some(loser) = result.loser() {
                let pvp = matches!(matchup.opponent, Opponent::Player(_));
                for (side, owner) in &sides {
                    let Some(player) = owner.as_ref().and_then(|o| self.players.get_mut(o)) else {
                        continue;
                    };
                    if *side == loser {
                        player.health -= i32::try_from(result.damage).unwrap_or(i32::MAX);
                        if pvp {
                            player.streak = player.streak.min(0) - 1;
                        }
                    } else if pvp {
                        player.streak = player.streak.max(0) + 1;
                    }
                }
            }
        }

        tracing::debug!(
            room = %self.id,
            player = %matchup.player,
            winner = ?result.winner,
            damage = result.damage,
            ticks = result.duration_ticks,
            "Combat resolved"
        );
        CombatReplay {
            matchup,
            home_owner,
            away_owner,
            seed,
            winner: result.winner,
            damage: result.damage,
            duration_ticks: result.duration_ticks,
            events: result.events,
        }
    }

    fn run_merchant(&mut self) {
        let mut order: Vec<(i32, String)> = self
            .players
            .values()
            .filter(|p| !p.eliminated)
            .map(|p| (p.health, p.id.clone()))
            .collect();
        order.sort();
        let offers = self.stats.merchant_items(&mut self.rng, order.len());
        for ((_, id), item) in order.iter().zip(&offers) {
            if let Some(player) = self.players.get_mut(id) {
                player.items.push(item.clone());
            }
        }
        self.events.push(RoomEvent::MerchantRound {
            order: order.into_iter().map(|(_, id)| id).collect(),
            offers,
        });
    }

    fn offer_crests(&mut self) {
        for player in self
            .players
            .values_mut()
            .filter(|p| !p.eliminated && p.crest.is_none())
        {
            let offers = self
                .stats
                .crest_offers(&mut self.rng, self.config.crest_offer_count);
            player.crest_offers.clone_from(&offers);
            self.events.push(RoomEvent::CrestOffers {
                player: player.id.clone(),
                offers,
            });
        }
    }

    fn eliminate_defeated(&mut self) {
        let defeated: Vec<String> = self
            .players
            .values()
            .filter(|p| !p.eliminated && p.health <= 0)
            .map(|p| p.id.clone())
            .collect();
        for id in defeated {
            self.eliminate(&id);
        }
    }

    fn eliminate(&mut self, id: &str) {
        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        if player.eliminated {
            return;
        }
        player.eliminated = true;
        player.eliminated_round = Some(self.round);
        player.ready = false;

        for offer in player.shop.drain(..).flatten() {
            self.pool.put(&offer.template, 1);
        }
        let bench: Vec<RosterUnit> = player.roster.bench.iter_mut().filter_map(Option::take).collect();
        let board: Vec<RosterUnit> = player.roster.board.drain(..).map(|b| b.unit).collect();
        for unit in board.iter().chain(&bench).chain(&player.deferred) {
            self.economy.return_to_pool(&mut self.pool, unit);
        }
        player.deferred.clear();

        self.history.forget(id);
        tracing::info!(room = %self.id, player = %id, round = self.round, "Player eliminated");
        self.events.push(RoomEvent::PlayerEliminated {
            player: id.to_string(),
            round: self.round,
        });
    }
}

fn deliver_loot(stats: &dyn StatProvider, player: &mut PlayerState) {
    for tag in std::mem::take(&mut player.queued_loot) {
        match tag {
            LootTag::Gold(amount) => player.gold += amount,
            LootTag::Item(item) if stats.is_known_item(&item) => player.items.push(item),
            LootTag::Unit { template, star } if stats.is_known_unit(&template) => {
                let id = player.roster.next_instance_id();
                let mut unit = RosterUnit::new(id, template);
                unit.star = star.clamp(1, MAX_STAR);
                player.deferred.push(unit);
            }
            other => {
                tracing::warn!(player = %player.id, loot = ?other, "Unknown loot, paying gold instead");
                player.gold += FALLBACK_LOOT_GOLD;
            }
        }
    }
}
