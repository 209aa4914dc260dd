//! Outbound wire messages.
//!
//! Messages are serialized as one JSON object per line with a `type` tag.
//! Combat replays are split into batches: the first batch of a replay
//! carries the metadata a client needs to set up the fight, the rest carry
//! only events. Batch order and event order within a replay are preserved.

use arena_core::error::ActionError;
use arena_core::events::{CombatEvent, CombatWinner};
use arena_core::matchup::{Matchup, Opponent};
use arena_core::room::{CombatReplay, Phase, RoomEvent, RoomView, RoundKind};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One side of a replayed combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamIdentity {
    /// Owner label used by the simulator.
    pub owner: String,
    /// Player id behind this side, if it is a live player.
    pub player: Option<String>,
    /// Hostile wave or ghost copy.
    pub hostile: bool,
}

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Joined a room.
    Joined {
        /// Room id.
        room_id: String,
        /// Your player id.
        player_id: String,
    },
    /// Someone left the room.
    PlayerLeft {
        /// Player id.
        player_id: String,
    },
    /// The room changed phase.
    Phase {
        /// New phase.
        phase: Phase,
        /// Current round.
        round: u32,
        /// Round kind.
        kind: RoundKind,
    },
    /// First batch of a combat replay.
    CombatStart {
        /// Round.
        round: u32,
        /// Who fought whom.
        matchup: Matchup,
        /// Home half.
        home: TeamIdentity,
        /// Away half.
        away: TeamIdentity,
        /// Simulator seed.
        seed: u64,
        /// Outcome, for clients that skip the animation.
        winner: CombatWinner,
        /// Damage dealt to the loser.
        damage: u32,
        /// Events across every batch of this replay.
        total_events: usize,
        /// Leading events.
        events: Vec<CombatEvent>,
        /// No further batches follow.
        is_last: bool,
    },
    /// A later batch of a combat replay.
    CombatBatch {
        /// Round.
        round: u32,
        /// Player the replay belongs to.
        player: String,
        /// Batch index, the start batch being 0.
        index: usize,
        /// Events.
        events: Vec<CombatEvent>,
        /// Final batch of the replay.
        is_last: bool,
    },
    /// A player is out.
    Eliminated {
        /// Player id.
        player: String,
        /// Round.
        round: u32,
    },
    /// Crests you may pick from.
    CrestOffers {
        /// Crest ids.
        offers: Vec<String>,
    },
    /// Merchant round outcome.
    Merchant {
        /// Pick order.
        order: Vec<String>,
        /// Item per pick.
        offers: Vec<String>,
    },
    /// An action was refused.
    ActionRejected {
        /// Why.
        error: ActionError,
    },
    /// Your view of the room.
    State {
        /// Snapshot.
        view: Box<RoomView>,
    },
    /// Match over.
    GameOver {
        /// Last player standing.
        winner: Option<String>,
    },
}

impl ServerMessage {
    /// Encode as a single JSON line without the trailing newline.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Who receives a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// Every player in the room.
    All,
    /// One player.
    Player(String),
}

/// A routed outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Room the message comes from.
    pub room_id: String,
    /// Target.
    pub to: Recipient,
    /// Payload.
    pub message: ServerMessage,
}

impl Envelope {
    /// Encode with its routing as a single JSON line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Split a replay into outbound batches of at most `batch_size` events.
///
/// Always yields at least the start message, even for an empty replay.
#[must_use]
pub fn batch_replay(round: u32, replay: &CombatReplay, batch_size: usize) -> Vec<ServerMessage> {
    let size = batch_size.max(1);
    let mut chunks = replay.events.chunks(size);
    let first = chunks.next().map(<[CombatEvent]>::to_vec).unwrap_or_default();
    let total_batches = replay.events.len().div_ceil(size).max(1);

    let (home, away) = identities(replay);
    let mut messages = Vec::with_capacity(total_batches);
    messages.push(ServerMessage::CombatStart {
        round,
        matchup: replay.matchup.clone(),
        home,
        away,
        seed: replay.seed,
        winner: replay.winner,
        damage: replay.damage,
        total_events: replay.events.len(),
        events: first,
        is_last: total_batches == 1,
    });
    for (offset, chunk) in chunks.enumerate() {
        let index = offset + 1;
        messages.push(ServerMessage::CombatBatch {
            round,
            player: replay.matchup.player.clone(),
            index,
            events: chunk.to_vec(),
            is_last: index + 1 == total_batches,
        });
    }
    messages
}

fn identities(replay: &CombatReplay) -> (TeamIdentity, TeamIdentity) {
    let matchup = &replay.matchup;
    let home = TeamIdentity {
        owner: replay.home_owner.clone(),
        player: Some(matchup.host.clone()),
        hostile: false,
    };
    let away = match &matchup.opponent {
        Opponent::Player(_) => TeamIdentity {
            owner: replay.away_owner.clone(),
            player: Some(replay.away_owner.clone()),
            hostile: false,
        },
        Opponent::Ghost(_) | Opponent::Pve => TeamIdentity {
            owner: replay.away_owner.clone(),
            player: None,
            hostile: true,
        },
    };
    (home, away)
}

/// Players a replay is delivered to.
#[must_use]
pub fn replay_recipients(replay: &CombatReplay) -> Vec<String> {
    let mut recipients = vec![replay.matchup.player.clone()];
    if let Opponent::Player(other) = &replay.matchup.opponent {
        recipients.push(other.clone());
    }
    recipients
}

/// Translate a room notification into routed messages.
///
/// Timer requests are driver-internal and produce nothing.
#[must_use]
pub fn route(room_id: &str, event: &RoomEvent, batch_size: usize) -> Vec<Envelope> {
    let envelope = |to: Recipient, message: ServerMessage| Envelope {
        room_id: room_id.to_string(),
        to,
        message,
    };
    match event {
        RoomEvent::PhaseChanged { phase, round, kind } => vec![envelope(
            Recipient::All,
            ServerMessage::Phase {
                phase: *phase,
                round: *round,
                kind: *kind,
            },
        )],
        RoomEvent::TimerRequested(_) | RoomEvent::CombatEnded { .. } | RoomEvent::ResultsEnded { .. } => {
            Vec::new()
        }
        RoomEvent::CombatStarted { round, replays, .. } => replays
            .iter()
            .flat_map(|replay| {
                let batches = batch_replay(*round, replay, batch_size);
                replay_recipients(replay).into_iter().flat_map(move |player| {
                    batches
                        .clone()
                        .into_iter()
                        .map(move |message| envelope(Recipient::Player(player.clone()), message))
                })
            })
            .collect(),
        RoomEvent::PlayerEliminated { player, round } => vec![envelope(
            Recipient::All,
            ServerMessage::Eliminated {
                player: player.clone(),
                round: *round,
            },
        )],
        RoomEvent::MerchantRound { order, offers } => vec![envelope(
            Recipient::All,
            ServerMessage::Merchant {
                order: order.clone(),
                offers: offers.clone(),
            },
        )],
        RoomEvent::CrestOffers { player, offers } => vec![envelope(
            Recipient::Player(player.clone()),
            ServerMessage::CrestOffers {
                offers: offers.clone(),
            },
        )],
        RoomEvent::GameOver { winner } => vec![envelope(
            Recipient::All,
            ServerMessage::GameOver {
                winner: winner.clone(),
            },
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::events::CombatEventKind;

    fn replay(events: usize, opponent: Opponent) -> CombatReplay {
        CombatReplay {
            matchup: Matchup {
                player: "p0".to_string(),
                opponent,
                host: "p0".to_string(),
            },
            home_owner: "p0".to_string(),
            away_owner: "p1".to_string(),
            seed: 9,
            winner: CombatWinner::Home,
            damage: 4,
            duration_ticks: 100,
            events: (0..events)
                .map(|i| CombatEvent {
                    tick: i as u32,
                    duration: 0,
                    kind: CombatEventKind::CombatEnd {
                        winner: CombatWinner::Home,
                        damage: 4,
                        duration_ticks: 100,
                    },
                })
                .collect(),
        }
    }

    fn batch_events(message: &ServerMessage) -> (usize, bool) {
        match message {
            ServerMessage::CombatStart { events, is_last, .. }
            | ServerMessage::CombatBatch { events, is_last, .. } => (events.len(), *is_last),
            other => panic!("not a batch: {other:?}"),
        }
    }

    #[test]
    fn test_batches_split_and_flag_last() {
        let messages = batch_replay(2, &replay(120, Opponent::Player("p1".into())), 50);
        let shape: Vec<_> = messages.iter().map(batch_events).collect();
        assert_eq!(shape, vec![(50, false), (50, false), (20, true)]);

        match &messages[0] {
            ServerMessage::CombatStart {
                total_events,
                round,
                ..
            } => {
                assert_eq!(*total_events, 120);
                assert_eq!(*round, 2);
            }
            other => panic!("expected start, got {other:?}"),
        }
        match &messages[2] {
            ServerMessage::CombatBatch { index, events, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(events[0].tick, 100);
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_multiple_and_empty_replays() {
        let exact = batch_replay(1, &replay(100, Opponent::Pve), 50);
        assert_eq!(exact.len(), 2);
        assert_eq!(batch_events(&exact[1]), (50, true));

        let empty = batch_replay(1, &replay(0, Opponent::Pve), 50);
        assert_eq!(empty.len(), 1);
        assert_eq!(batch_events(&empty[0]), (0, true));

        let zero = batch_replay(1, &replay(3, Opponent::Pve), 0);
        assert_eq!(zero.len(), 3);
    }

    #[test]
    fn test_replays_reach_both_live_players_only() {
        let pvp = replay(1, Opponent::Player("p1".into()));
        assert_eq!(replay_recipients(&pvp), vec!["p0", "p1"]);
        let ghost = replay(1, Opponent::Ghost("p1".into()));
        assert_eq!(replay_recipients(&ghost), vec!["p0"]);
        let (_, away) = identities(&ghost);
        assert!(away.hostile);
        assert_eq!(away.player, None);
    }

    #[test]
    fn test_crest_offers_are_private() {
        let event = RoomEvent::CrestOffers {
            player: "p1".to_string(),
            offers: vec!["iron_will".to_string()],
        };
        let routed = route("r", &event, 50);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].to, Recipient::Player("p1".to_string()));
    }

    #[test]
    fn test_json_is_tagged() {
        let json = ServerMessage::GameOver {
            winner: Some("p2".to_string()),
        }
        .to_json()
        .expect("encodes");
        assert_eq!(json, r#"{"type":"game_over","winner":"p2"}"#);
    }
}
