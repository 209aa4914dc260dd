//! # Arena Core
//!
//! Deterministic match engine for Hex Arena, a round-based auto-battler.
//!
//! This crate contains **only** deterministic logic:
//! - No IO besides parsing strings handed to it
//! - No system randomness (every RNG is a seeded `ChaCha8Rng`)
//! - No floating-point math in combat (uses fixed-point)
//!
//! The server drives it; clients only replay what it emits.
//!
//! ## Crate Structure
//!
//! - [`hex`] - Offset hex grid and board halves
//! - [`simulation`] - Tick-based combat simulator
//! - [`damage`] - Damage formula
//! - [`ability`] - Ability definitions
//! - [`passives`] - Item and trait passives
//! - [`room`] - Round and phase state machine
//! - [`matchup`] - PvP pairing and host alternation
//! - [`roster`] - Board, bench and star merging
//! - [`services`] - Collaborator traits
//! - [`catalog`] / [`shop`] - Reference data and economy

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ability;
pub mod catalog;
pub mod damage;
pub mod data;
pub mod effects;
pub mod error;
pub mod events;
pub mod hex;
pub mod matchup;
pub mod math;
pub mod passives;
pub mod pathfinding;
mod resolver;
pub mod room;
pub mod roster;
pub mod services;
pub mod shop;
pub mod simulation;
pub mod stats;
pub mod targeting;
pub mod unit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::ability::{Ability, AbilityEffect, TargetMode};
    pub use crate::catalog::Catalog;
    pub use crate::error::{ActionError, ArenaError, Result};
    pub use crate::events::{CombatEvent, CombatEventKind, CombatWinner};
    pub use crate::hex::{HexCoord, Side};
    pub use crate::math::Fixed;
    pub use crate::matchup::{Matchup, Opponent};
    pub use crate::room::{
        Phase, PlayerAction, PlayerState, Room, RoomConfig, RoomEvent, RoundKind, TimerKind,
        TimerRequest,
    };
    pub use crate::roster::{Roster, RosterUnit, Slot};
    pub use crate::services::{Economy, StatProvider};
    pub use crate::shop::{BasicEconomy, EconomyConfig};
    pub use crate::simulation::{
        CombatResult, CombatSimulator, CombatTeam, MatchVariables, SimConfig,
    };
    pub use crate::stats::{DamageType, Element, UnitStats};
    pub use crate::unit::{LootTag, UnitId, UnitSpec};
}
