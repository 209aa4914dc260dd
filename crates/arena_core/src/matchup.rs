//! PvP pairing and host assignment.
//!
//! Active players are shuffled and paired consecutively. An odd player out
//! fights a ghost copy of another player's board; ghost results never
//! change health or streaks.
//!
//! The host fights from the [`crate::hex::Side::Home`] half and wins exact
//! timeout ties, so hosting alternates: when two players meet again the
//! other one hosts. First meetings pick the host with the room's RNG.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Who a player fights this round.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opponent {
    /// Another live player.
    Player(String),
    /// A copy of this player's board; results are not applied to it.
    Ghost(String),
    /// A hostile wave.
    Pve,
}

/// One pairing for a combat phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    /// The player this matchup belongs to.
    pub player: String,
    /// The opponent.
    pub opponent: Opponent,
    /// Player id fighting from the home half.
    pub host: String,
}

impl Matchup {
    /// Whether the opponent is a ghost copy.
    #[must_use]
    pub fn is_ghost(&self) -> bool {
        matches!(self.opponent, Opponent::Ghost(_))
    }

    /// The opponent's player id, for live and ghost opponents.
    #[must_use]
    pub fn opponent_id(&self) -> Option<&str> {
        match &self.opponent {
            Opponent::Player(id) | Opponent::Ghost(id) => Some(id),
            Opponent::Pve => None,
        }
    }

    /// Player ids whose results this matchup decides.
    #[must_use]
    pub fn participants(&self) -> Vec<&str> {
        match &self.opponent {
            Opponent::Player(other) => vec![self.player.as_str(), other.as_str()],
            Opponent::Ghost(_) | Opponent::Pve => vec![self.player.as_str()],
        }
    }
}

/// Last host per unordered pair of players.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostHistory {
    last_host: BTreeMap<(String, String), String>,
}

impl HostHistory {
    /// Empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Last host of a pair, if they have met.
    #[must_use]
    pub fn last_host(&self, a: &str, b: &str) -> Option<&str> {
        self.last_host.get(&Self::key(a, b)).map(String::as_str)
    }

    /// Choose and record the host for `a` against `b`.
    pub fn assign<R: Rng + ?Sized>(&mut self, a: &str, b: &str, rng: &mut R) -> String {
        let host = match self.last_host(a, b) {
            Some(last) if last == a => b.to_string(),
            Some(_) => a.to_string(),
            None if rng.gen_bool(0.5) => a.to_string(),
            None => b.to_string(),
        };
        self.last_host.insert(Self::key(a, b), host.clone());
        host
    }

    /// Forget every pairing involving `player`.
    pub fn forget(&mut self, player: &str) {
        self.last_host.retain(|(a, b), _| a != player && b != player);
    }
}

/// Pair up `players` for a PvP round.
///
/// `players` should already be in a stable order; the shuffle is the only
/// source of variation.
pub fn generate_matchups<R: Rng + ?Sized>(
    players: &[String],
    history: &mut HostHistory,
    rng: &mut R,
) -> Vec<Matchup> {
    let mut order = players.to_vec();
    order.shuffle(rng);

    let mut matchups = Vec::with_capacity(order.len().div_ceil(2));
    let mut pairs = order.chunks_exact(2);
    for pair in pairs.by_ref() {
        let host = history.assign(&pair[0], &pair[1], rng);
        matchups.push(Matchup {
            player: pair[0].clone(),
            opponent: Opponent::Player(pair[1].clone()),
            host,
        });
    }

    if let [odd] = pairs.remainder() {
        let others: Vec<&String> = players.iter().filter(|p| *p != odd).collect();
        if let Some(copy) = others.choose(rng) {
            tracing::debug!(player = %odd, ghost = %copy, "Odd player fights a ghost");
            matchups.push(Matchup {
                player: odd.clone(),
                opponent: Opponent::Ghost((*copy).clone()),
                host: odd.clone(),
            });
        }
    }
    matchups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{i}")).collect()
    }

    #[test]
    fn test_two_players_single_matchup() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut history = HostHistory::new();
        let matchups = generate_matchups(&ids(2), &mut history, &mut rng);
        assert_eq!(matchups.len(), 1);
        assert!(!matchups[0].is_ghost());
        assert_eq!(matchups[0].participants().len(), 2);
    }

    #[test]
    fn test_three_players_get_one_ghost() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut history = HostHistory::new();
        let matchups = generate_matchups(&ids(3), &mut history, &mut rng);
        assert_eq!(matchups.len(), 2);
        let ghost = matchups.iter().find(|m| m.is_ghost()).expect("ghost matchup");
        assert_ne!(ghost.opponent_id(), Some(ghost.player.as_str()));
        assert_eq!(ghost.host, ghost.player);
    }

    #[test]
    fn test_four_players_everyone_fights_once() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut history = HostHistory::new();
        let matchups = generate_matchups(&ids(4), &mut history, &mut rng);
        assert_eq!(matchups.len(), 2);
        let mut seen: Vec<&str> = matchups.iter().flat_map(Matchup::participants).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["p0", "p1", "p2", "p3"]);
    }

    #[test]
    fn test_host_alternates_between_rounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut history = HostHistory::new();
        let players = ids(2);
        let mut last = None;
        for _ in 0..6 {
            let host = generate_matchups(&players, &mut history, &mut rng)
                .remove(0)
                .host;
            if let Some(previous) = last {
                assert_ne!(host, previous);
            }
            last = Some(host);
        }
    }

    #[test]
    fn test_forget_resets_pair() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut history = HostHistory::new();
        history.assign("a", "b", &mut rng);
        history.forget("a");
        assert_eq!(history.last_host("a", "b"), None);
    }
}
