//! Bot matches driven end to end through the room task.

use std::collections::BTreeMap;

use arena_core::room::Phase;
use arena_server::headless::{run_match, HeadlessOptions};
use arena_server::protocol::{Envelope, Recipient, ServerMessage};
use arena_server::ServerConfig;

async fn play(players: usize, seed: u64, max_rounds: u32) -> (Vec<Envelope>, arena_server::headless::MatchSummary) {
    let mut seen = Vec::new();
    let summary = run_match(
        ServerConfig::default(),
        &HeadlessOptions {
            players,
            seed,
            max_rounds: Some(max_rounds),
        },
        |envelope| seen.push(envelope.clone()),
    )
    .await
    .expect("match runs");
    (seen, summary)
}

#[tokio::test(start_paused = true)]
async fn test_bots_play_several_rounds() {
    let (seen, summary) = play(3, 21, 5).await;

    assert_eq!(summary.messages, seen.len());
    assert!(summary.finished || summary.rounds == 6);

    let starts = seen
        .iter()
        .filter(|e| matches!(e.message, ServerMessage::CombatStart { .. }))
        .count();
    assert!(starts >= 3, "intro round sends one replay per bot");

    let placed = seen.iter().any(|e| match &e.message {
        ServerMessage::State { view } => !view.you.roster.board.is_empty(),
        _ => false,
    });
    assert!(placed, "bots put units on the board");
}

#[tokio::test(start_paused = true)]
async fn test_replay_batches_arrive_in_order() {
    let (seen, _) = play(2, 4, 4).await;

    // Per recipient, each replay is a start followed by consecutive batches.
    let mut expected: BTreeMap<String, (usize, bool)> = BTreeMap::new();
    for envelope in &seen {
        let Recipient::Player(player) = &envelope.to else {
            continue;
        };
        match &envelope.message {
            ServerMessage::CombatStart {
                events,
                total_events,
                is_last,
                ..
            } => {
                if let Some((_, done)) = expected.get(player) {
                    assert!(*done, "previous replay for {player} was finished");
                }
                assert!(events.len() <= *total_events);
                expected.insert(player.clone(), (1, *is_last));
            }
            ServerMessage::CombatBatch { index, is_last, .. } => {
                let (next, done) = expected.get_mut(player).expect("start came first");
                assert!(!*done);
                assert_eq!(index, next);
                *next += 1;
                *done = *is_last;
            }
            _ => {}
        }
    }
    assert!(expected.values().all(|(_, done)| *done));
}

#[tokio::test(start_paused = true)]
async fn test_phases_cycle_in_order() {
    let (seen, _) = play(2, 8, 3).await;

    let phases: Vec<(Phase, u32)> = seen
        .iter()
        .filter_map(|e| match e.message {
            ServerMessage::Phase { phase, round, .. } => Some((phase, round)),
            _ => None,
        })
        .collect();
    assert_eq!(phases[0], (Phase::Planning, 1));
    for pair in phases.windows(2) {
        let ok = match (pair[0].0, pair[1].0) {
            (Phase::Planning, Phase::Combat) | (Phase::Combat, Phase::Results) => {
                pair[0].1 == pair[1].1
            }
            (Phase::Results, Phase::Planning) => pair[1].1 == pair[0].1 + 1,
            (Phase::Results, Phase::GameOver) => true,
            _ => false,
        };
        assert!(ok, "unexpected transition {pair:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_stream() {
    let (a, _) = play(2, 33, 3).await;
    let (b, _) = play(2, 33, 3).await;
    assert_eq!(a, b);
}
