//! Error types for the match engine.
//!
//! Two families live here:
//! - [`ArenaError`] for data loading and room lifecycle failures.
//! - [`ActionError`] for player actions rejected by the state machine. These
//!   are reason codes surfaced synchronously to the caller; the room is left
//!   unchanged whenever one is returned.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`ArenaError`].
pub type Result<T> = std::result::Result<T, ArenaError>;

/// Top-level error type for engine setup and room lifecycle.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// Data file parsing error.
    #[error("Failed to parse data '{source_name}': {message}")]
    DataParseError {
        /// Name of the data source that failed to parse.
        source_name: String,
        /// Error message.
        message: String,
    },

    /// Referenced template does not exist in the catalog.
    #[error("Unknown unit template: {0}")]
    UnknownTemplate(String),

    /// A room-level operation was rejected.
    #[error("Room operation rejected: {0}")]
    Room(#[from] ActionError),

    /// Invalid engine state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Reason a player action or room operation was rejected.
///
/// Serializable so that a transport layer can forward the code verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ActionError {
    /// The action is not legal in the current phase.
    #[error("Action not allowed during {phase} phase")]
    WrongPhase {
        /// Name of the phase the room was in.
        phase: String,
    },

    /// The player is not part of this room.
    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    /// The player has already been eliminated.
    #[error("Player {0} has been eliminated")]
    PlayerEliminated(String),

    /// The match has already ended.
    #[error("Game is over")]
    GameOver,

    /// The match has already started.
    #[error("Game already started")]
    AlreadyStarted,

    /// Not enough players to start.
    #[error("Need at least {required} players, have {available}")]
    NotEnoughPlayers {
        /// Minimum player count.
        required: usize,
        /// Players currently in the room.
        available: usize,
    },

    /// The room is full.
    #[error("Room is full ({0} players)")]
    RoomFull(usize),

    /// The player id is already taken in this room.
    #[error("Player {0} already joined")]
    DuplicatePlayer(String),

    /// A bench or board slot reference does not hold a unit.
    #[error("No unit at {0}")]
    InvalidSlot(String),

    /// A board position is outside the player's half.
    #[error("Position ({x}, {y}) is outside the deployment zone")]
    InvalidPosition {
        /// Column.
        x: i32,
        /// Row.
        y: i32,
    },

    /// A shop index is out of range or already bought.
    #[error("Invalid shop index: {0}")]
    InvalidShopIndex(usize),

    /// An inventory or crest index is out of range.
    #[error("Invalid item index: {0}")]
    InvalidItem(usize),

    /// The unit already carries the maximum number of items.
    #[error("Unit cannot hold more items")]
    ItemSlotsFull,

    /// Not enough gold.
    #[error("Insufficient gold: need {required}, have {available}")]
    InsufficientGold {
        /// Gold required.
        required: u32,
        /// Gold available.
        available: u32,
    },

    /// Bench has no free slot.
    #[error("Bench is full")]
    BenchFull,

    /// Board already holds as many units as the player's level allows.
    #[error("Board is full ({0} units)")]
    BoardFull(usize),

    /// The unit pool has no copies left of the template.
    #[error("No copies of {0} left in the pool")]
    PoolExhausted(String),

    /// The player is already at the maximum level.
    #[error("Already at max level")]
    MaxLevel,

    /// A crest has already been chosen this draft.
    #[error("Crest already selected")]
    CrestAlreadySelected,
}
