//! Server error types.

use std::path::PathBuf;

use arena_core::error::{ActionError, ArenaError};
use thiserror::Error;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised by the room driver and its tooling.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid RON for [`crate::config::ServerConfig`].
    #[error("Failed to parse config: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Catalog or engine data error.
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// The room refused a command.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// No room with this id.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// A room with this id is already running.
    #[error("Room already exists: {0}")]
    RoomExists(String),

    /// The room task has stopped.
    #[error("Room {0} has shut down")]
    RoomClosed(String),

    /// An outbound message could not be encoded.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
