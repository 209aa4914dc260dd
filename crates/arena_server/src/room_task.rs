//! One tokio task per room.
//!
//! The task owns its [`Room`] outright and is driven by three sources:
//! commands from [`RoomHandle`]s, phase timers it armed itself, and the
//! shutdown token. Room notifications are drained after every input,
//! routed through [`crate::protocol::route`] and pushed to the outbound
//! channel in order.
//!
//! Each phase timer is a spawned sleep holding a child of the room's
//! cancellation token. Arming a new timer cancels the previous one, and
//! the room itself ignores a timer whose generation is stale.

use std::sync::Arc;
use std::time::Duration;

use arena_core::error::ActionError;
use arena_core::room::{Phase, PlayerAction, Room, RoomEvent, RoomView, TimerKind, TimerRequest};
use arena_core::services::{Economy, StatProvider};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::protocol::{route, Envelope, Recipient, ServerMessage};

/// Reply channel for room operations that can be refused.
type Reply = oneshot::Sender<std::result::Result<(), ActionError>>;

/// Commands accepted by a room task.
#[derive(Debug)]
pub enum RoomCommand {
    /// Join the lobby.
    Join {
        /// Player id.
        player_id: String,
        /// Display name.
        name: String,
        /// Outcome.
        reply: Reply,
    },
    /// Leave the room.
    Leave {
        /// Player id.
        player_id: String,
        /// Outcome.
        reply: Reply,
    },
    /// Start the match.
    Start {
        /// Outcome.
        reply: Reply,
    },
    /// A player command.
    Action {
        /// Player id.
        player_id: String,
        /// The command.
        action: PlayerAction,
        /// Outcome.
        reply: Reply,
    },
    /// Snapshot for one player.
    View {
        /// Player id.
        player_id: String,
        /// The view, if the player is in the room.
        reply: oneshot::Sender<Option<RoomView>>,
    },
    /// Summary of the room.
    Status {
        /// The summary.
        reply: oneshot::Sender<RoomStatus>,
    },
}

/// Coarse room state for registries and tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    /// Phase.
    pub phase: Phase,
    /// Round.
    pub round: u32,
    /// Players still in the match.
    pub active: Vec<String>,
    /// Winner once over.
    pub winner: Option<String>,
}

/// A fired phase timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerFired {
    generation: u64,
    kind: TimerKind,
}

/// The single pending phase timer of a room.
struct PhaseTimer {
    parent: CancellationToken,
    current: Option<CancellationToken>,
    fired: mpsc::UnboundedSender<TimerFired>,
}

impl PhaseTimer {
    fn new(parent: CancellationToken, fired: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            parent,
            current: None,
            fired,
        }
    }

    fn arm(&mut self, request: TimerRequest, delay: Duration) {
        self.cancel();
        let token = self.parent.child_token();
        self.current = Some(token.clone());
        let fired = self.fired.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = fired.send(TimerFired {
                        generation: request.generation,
                        kind: request.kind,
                    });
                }
            }
        });
    }

    fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

/// Cloneable handle to a running room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: String,
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Room id.
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Join the lobby.
    pub async fn join(&self, player_id: &str, name: &str) -> Result<()> {
        self.refusable(|reply| RoomCommand::Join {
            player_id: player_id.to_string(),
            name: name.to_string(),
            reply,
        })
        .await
    }

    /// Leave the room.
    pub async fn leave(&self, player_id: &str) -> Result<()> {
        self.refusable(|reply| RoomCommand::Leave {
            player_id: player_id.to_string(),
            reply,
        })
        .await
    }

    /// Start the match.
    pub async fn start(&self) -> Result<()> {
        self.refusable(|reply| RoomCommand::Start { reply }).await
    }

    /// Submit a player command.
    pub async fn act(&self, player_id: &str, action: PlayerAction) -> Result<()> {
        self.refusable(|reply| RoomCommand::Action {
            player_id: player_id.to_string(),
            action,
            reply,
        })
        .await
    }

    /// A player's view of the room.
    pub async fn view(&self, player_id: &str) -> Result<Option<RoomView>> {
        self.request(|reply| RoomCommand::View {
            player_id: player_id.to_string(),
            reply,
        })
        .await
    }

    /// Room summary.
    pub async fn status(&self) -> Result<RoomStatus> {
        self.request(|reply| RoomCommand::Status { reply }).await
    }

    async fn refusable(
        &self,
        command: impl FnOnce(Reply) -> RoomCommand,
    ) -> Result<()> {
        self.request(command).await?.map_err(ServerError::from)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> RoomCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| ServerError::RoomClosed(self.room_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| ServerError::RoomClosed(self.room_id.clone()))
    }
}

/// Background task that owns one room.
pub struct RoomTask {
    room: Room,
    config: Arc<ServerConfig>,
    commands: mpsc::Receiver<RoomCommand>,
    timer: PhaseTimer,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    outbound: mpsc::UnboundedSender<Envelope>,
    shutdown: CancellationToken,
}

/// Create a room and spawn its task.
///
/// The task stops when `shutdown` is cancelled, when every handle is
/// dropped, or when the last player leaves.
pub fn spawn_room(
    room_id: &str,
    seed: u64,
    config: Arc<ServerConfig>,
    stats: Arc<dyn StatProvider>,
    economy: Arc<dyn Economy>,
    outbound: mpsc::UnboundedSender<Envelope>,
    shutdown: CancellationToken,
) -> (RoomHandle, JoinHandle<()>) {
    let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let room = Room::new(room_id, config.room.clone(), stats, economy, seed);
    let task = RoomTask {
        room,
        config,
        commands: command_rx,
        timer: PhaseTimer::new(shutdown.clone(), timer_tx),
        timer_rx,
        outbound,
        shutdown,
    };
    let handle = RoomHandle {
        room_id: room_id.to_string(),
        commands: command_tx,
    };
    (handle, tokio::spawn(task.run()))
}

impl RoomTask {
    /// Main loop.
    pub async fn run(mut self) {
        info!(room = %self.room.id(), "Room task started");
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                Some(fired) = self.timer_rx.recv() => {
                    self.room.on_timer(fired.generation, fired.kind);
                    self.flush();
                }
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle_command(command) {
                        break;
                    }
                }
            }
        }
        self.timer.cancel();
        info!(room = %self.room.id(), round = self.room.round(), "Room task stopped");
    }

    /// Returns `true` when the room should close.
    fn handle_command(&mut self, command: RoomCommand) -> bool {
        let mut close = false;
        match command {
            RoomCommand::Join {
                player_id,
                name,
                reply,
            } => {
                let result = self.room.add_player(player_id.clone(), name);
                if result.is_ok() {
                    self.send(
                        Recipient::Player(player_id.clone()),
                        ServerMessage::Joined {
                            room_id: self.room.id().to_string(),
                            player_id,
                        },
                    );
                }
                let _ = reply.send(result);
            }
            RoomCommand::Leave { player_id, reply } => {
                let result = self.room.remove_player(&player_id);
                if result.is_ok() {
                    self.send(Recipient::All, ServerMessage::PlayerLeft { player_id });
                    close = self.room.is_empty();
                }
                let _ = reply.send(result);
            }
            RoomCommand::Start { reply } => {
                let _ = reply.send(self.room.start_game());
            }
            RoomCommand::Action {
                player_id,
                action,
                reply,
            } => {
                let result = self.room.handle_action(&player_id, action);
                match &result {
                    Ok(()) => self.send_view(&player_id),
                    Err(error) => self.send(
                        Recipient::Player(player_id.clone()),
                        ServerMessage::ActionRejected {
                            error: error.clone(),
                        },
                    ),
                }
                let _ = reply.send(result);
            }
            RoomCommand::View { player_id, reply } => {
                let _ = reply.send(self.room.view_for(&player_id));
            }
            RoomCommand::Status { reply } => {
                let _ = reply.send(RoomStatus {
                    phase: self.room.phase(),
                    round: self.room.round(),
                    active: self.room.active_ids(),
                    winner: self.room.winner().map(str::to_string),
                });
            }
        }
        self.flush();
        if close {
            debug!(room = %self.room.id(), "Last player left");
        }
        close
    }

    fn flush(&mut self) {
        let mut planning = false;
        for event in self.room.drain_events() {
            match &event {
                RoomEvent::TimerRequested(request) => {
                    let delay = self.config.timer_duration(request.duration_ms);
                    trace!(room = %self.room.id(), ?request, ?delay, "Arming timer");
                    self.timer.arm(*request, delay);
                }
                RoomEvent::PhaseChanged {
                    phase: Phase::Planning,
                    ..
                } => planning = true,
                RoomEvent::GameOver { .. } => self.timer.cancel(),
                _ => {}
            }
            for envelope in route(self.room.id(), &event, self.config.batch_size) {
                self.push(envelope);
            }
        }
        if planning {
            for player_id in self.room.active_ids() {
                self.send_view(&player_id);
            }
        }
    }

    fn send_view(&self, player_id: &str) {
        if let Some(view) = self.room.view_for(player_id) {
            self.send(
                Recipient::Player(player_id.to_string()),
                ServerMessage::State {
                    view: Box::new(view),
                },
            );
        }
    }

    fn send(&self, to: Recipient, message: ServerMessage) {
        self.push(Envelope {
            room_id: self.room.id().to_string(),
            to,
            message,
        });
    }

    fn push(&self, envelope: Envelope) {
        if self.outbound.send(envelope).is_err() {
            warn!(room = %self.room.id(), "Outbound channel closed, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::room::RoundKind;
    use arena_test_utils::fixtures::builtin_catalog;

    struct Harness {
        handle: RoomHandle,
        task: JoinHandle<()>,
        outbound: mpsc::UnboundedReceiver<Envelope>,
        shutdown: CancellationToken,
    }

    fn harness(config: ServerConfig) -> Harness {
        let config = Arc::new(config);
        let catalog = builtin_catalog();
        let economy = config.economy(Arc::clone(&catalog));
        let (tx, outbound) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let (handle, task) = spawn_room(
            "room-1",
            7,
            config,
            catalog,
            economy,
            tx,
            shutdown.clone(),
        );
        Harness {
            handle,
            task,
            outbound,
            shutdown,
        }
    }

    async fn next_phase(outbound: &mut mpsc::UnboundedReceiver<Envelope>) -> (Phase, u32, RoundKind) {
        loop {
            let envelope = outbound.recv().await.expect("room is running");
            if let ServerMessage::Phase { phase, round, kind } = envelope.message {
                return (phase, round, kind);
            }
        }
    }

    async fn started(config: ServerConfig) -> Harness {
        let harness = harness(config);
        harness.handle.join("p0", "Ada").await.expect("joins");
        harness.handle.join("p1", "Bo").await.expect("joins");
        harness.handle.start().await.expect("starts");
        harness
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearm_cancels_previous() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = PhaseTimer::new(CancellationToken::new(), tx);
        let request = |generation| TimerRequest {
            generation,
            kind: TimerKind::Planning,
            duration_ms: 0,
        };
        timer.arm(request(1), Duration::from_millis(10));
        timer.arm(request(2), Duration::from_millis(20));

        let fired = rx.recv().await.expect("second timer fires");
        assert_eq!(fired.generation, 2);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parent = CancellationToken::new();
        let mut timer = PhaseTimer::new(parent.clone(), tx);
        timer.arm(
            TimerRequest {
                generation: 1,
                kind: TimerKind::Results,
                duration_ms: 0,
            },
            Duration::from_millis(10),
        );
        parent.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_announces_planning_and_views() {
        let mut h = started(ServerConfig::default()).await;

        let mut joined = 0;
        let mut views = Vec::new();
        let mut planning = None;
        while views.len() < 2 {
            let envelope = h.outbound.recv().await.expect("room is running");
            match envelope.message {
                ServerMessage::Joined { .. } => joined += 1,
                ServerMessage::Phase { phase, round, .. } => planning = Some((phase, round)),
                ServerMessage::State { view } => {
                    assert_eq!(envelope.to, Recipient::Player(view.you.id.clone()));
                    assert_eq!(view.you.shop.len(), 5);
                    assert!(view.others.iter().all(|o| o.id != view.you.id));
                    views.push(view.you.id.clone());
                }
                _ => {}
            }
        }
        assert_eq!(joined, 2);
        assert_eq!(planning, Some((Phase::Planning, 1)));
        views.sort();
        assert_eq!(views, vec!["p0", "p1"]);
        h.shutdown.cancel();
        h.task.await.expect("task exits");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_players_run_a_full_round() {
        let mut h = started(ServerConfig::default()).await;
        assert_eq!(next_phase(&mut h.outbound).await.0, Phase::Planning);

        h.handle.act("p0", PlayerAction::Ready).await.expect("ready");
        h.handle.act("p1", PlayerAction::Ready).await.expect("ready");

        let mut replays = Vec::new();
        let mut phases = Vec::new();
        while phases.last() != Some(&(Phase::Planning, 2)) {
            let envelope = h.outbound.recv().await.expect("room is running");
            match envelope.message {
                ServerMessage::Phase { phase, round, .. } => phases.push((phase, round)),
                ServerMessage::CombatStart { matchup, .. } => {
                    assert_eq!(envelope.to, Recipient::Player(matchup.player.clone()));
                    replays.push(matchup.player);
                }
                _ => {}
            }
        }
        assert_eq!(
            phases,
            vec![(Phase::Combat, 1), (Phase::Results, 1), (Phase::Planning, 2)]
        );
        replays.sort();
        assert_eq!(replays, vec!["p0", "p1"]);

        let status = h.handle.status().await.expect("running");
        assert_eq!(status.round, 2);
        assert_eq!(status.phase, Phase::Planning);
        h.shutdown.cancel();
        h.task.await.expect("task exits");
    }

    #[tokio::test(start_paused = true)]
    async fn test_planning_timer_forces_combat() {
        let mut h = started(ServerConfig::default()).await;
        assert_eq!(next_phase(&mut h.outbound).await, (Phase::Planning, 1, RoundKind::IntroPve));
        // Nobody readies; the planning timer ends the phase.
        assert_eq!(next_phase(&mut h.outbound).await.0, Phase::Combat);
        h.shutdown.cancel();
        h.task.await.expect("task exits");
    }

    #[tokio::test]
    async fn test_rejected_action_is_reported() {
        let mut h = harness(ServerConfig::default());
        h.handle.join("p0", "Ada").await.expect("joins");

        let err = h.handle.act("p0", PlayerAction::BuyXp).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Action(ActionError::WrongPhase { .. })
        ));

        let mut rejected = false;
        while let Ok(envelope) = h.outbound.try_recv() {
            if let ServerMessage::ActionRejected { error } = envelope.message {
                assert_eq!(envelope.to, Recipient::Player("p0".to_string()));
                assert!(matches!(error, ActionError::WrongPhase { .. }));
                rejected = true;
            }
        }
        assert!(rejected);
        h.shutdown.cancel();
        h.task.await.expect("task exits");
    }

    #[tokio::test]
    async fn test_last_player_leaving_stops_task() {
        let h = harness(ServerConfig::default());
        h.handle.join("p0", "Ada").await.expect("joins");
        h.handle.join("p1", "Bo").await.expect("joins");
        h.handle.leave("p0").await.expect("leaves");
        assert!(!h.handle.is_closed());
        h.handle.leave("p1").await.expect("leaves");

        h.task.await.expect("task exits");
        assert!(h.handle.is_closed());
        assert!(matches!(
            h.handle.status().await,
            Err(ServerError::RoomClosed(_))
        ));
    }
}
