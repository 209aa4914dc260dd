//! Bot-only matches without a network front end.

use arena_core::room::Phase;
use tokio::sync::mpsc;
use tracing::info;

use crate::bots::Bot;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::{Envelope, Recipient, ServerMessage};
use crate::registry::RoomRegistry;

/// Room id used for headless matches.
pub const HEADLESS_ROOM: &str = "headless";

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessOptions {
    /// Bots in the room.
    pub players: usize,
    /// Room seed; bot seeds derive from it.
    pub seed: u64,
    /// Stop after this many rounds even if nobody has won.
    pub max_rounds: Option<u32>,
}

/// How a headless match ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    /// Winner, if the match finished with one.
    pub winner: Option<String>,
    /// Last round reached.
    pub rounds: u32,
    /// Outbound messages observed.
    pub messages: usize,
    /// The match reached game over.
    pub finished: bool,
}

/// Run one match between bots, passing every outbound message to `sink`.
pub async fn run_match(
    config: ServerConfig,
    options: &HeadlessOptions,
    mut sink: impl FnMut(&Envelope),
) -> Result<MatchSummary> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut registry = RoomRegistry::new(config, tx)?;
    let room = registry.create_room(HEADLESS_ROOM, options.seed)?;

    let mut bots: Vec<Bot> = (0..options.players)
        .map(|i| Bot::new(format!("bot{i}"), options.seed.wrapping_add(i as u64 + 1)))
        .collect();
    for bot in &bots {
        room.join(bot.player_id(), bot.player_id()).await?;
    }
    room.start().await?;

    let mut summary = MatchSummary {
        winner: None,
        rounds: 0,
        messages: 0,
        finished: false,
    };
    while let Some(envelope) = rx.recv().await {
        sink(&envelope);
        summary.messages += 1;
        match &envelope.message {
            ServerMessage::Phase {
                phase: Phase::Planning,
                round,
                ..
            } if envelope.to == Recipient::All => {
                summary.rounds = *round;
                if options.max_rounds.is_some_and(|max| *round > max) {
                    info!(round, "Round limit reached");
                    break;
                }
                for bot in &mut bots {
                    bot.play_planning(&room).await?;
                }
            }
            ServerMessage::GameOver { winner } => {
                summary.winner.clone_from(winner);
                summary.finished = true;
                break;
            }
            _ => {}
        }
    }

    registry.shutdown().await;
    info!(
        winner = ?summary.winner,
        rounds = summary.rounds,
        messages = summary.messages,
        "Headless match done"
    );
    Ok(summary)
}
