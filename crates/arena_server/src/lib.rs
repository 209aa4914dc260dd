//! # Arena Server
//!
//! Async driver for [`arena_core`] rooms.
//!
//! Each room runs in its own tokio task that owns the
//! [`Room`](arena_core::room::Room) and turns its notifications into
//! routed [`ServerMessage`](protocol::ServerMessage)s. Phase timers are
//! spawned sleeps that are cancelled through `tokio_util`'s
//! `CancellationToken` when a transition replaces them.
//!
//! No transport lives here: messages come out of an mpsc channel as
//! [`Envelope`](protocol::Envelope)s and the binary prints them as JSON
//! lines.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod bots;
pub mod config;
pub mod error;
pub mod headless;
pub mod protocol;
pub mod registry;
pub mod room_task;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use registry::RoomRegistry;
pub use room_task::RoomHandle;
