//! Data structures for the unit catalog.
//!
//! Pure data types deserialized from RON. Lookups, validation and the
//! [`crate::services::StatProvider`] implementation live in
//! [`crate::catalog`].

mod item_data;
mod trait_data;
mod unit_data;
mod wave_data;

pub use item_data::{CrestData, ItemData};
pub use trait_data::{TraitData, TraitTier};
pub use unit_data::UnitData;
pub use wave_data::{WaveData, WaveUnit};
