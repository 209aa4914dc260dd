//! Server configuration, loaded from RON.
//!
//! Every field has a default, so a config file only lists what it changes:
//!
//! ```ron
//! (
//!     batch_size: 25,
//!     time_scale: 0.1,
//!     room: (planning_ms: 20000),
//! )
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arena_core::catalog::Catalog;
use arena_core::room::RoomConfig;
use arena_core::shop::{BasicEconomy, EconomyConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Events per outbound replay batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Rules every room is created with.
    pub room: RoomConfig,
    /// Shop and income tunables.
    pub economy: EconomyConfig,
    /// Combat events per outbound batch.
    pub batch_size: usize,
    /// Capacity of each room's command queue.
    pub command_buffer: usize,
    /// Multiplier on every phase timer. `0.0` fires timers immediately.
    pub time_scale: f64,
    /// Catalog file; the built-in catalog when unset.
    pub catalog_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            room: RoomConfig::default(),
            economy: EconomyConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            command_buffer: 64,
            time_scale: 1.0,
            catalog_path: None,
        }
    }
}

impl ServerConfig {
    /// Parse a config from RON text.
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read(path)?;
        let config = Self::from_ron(&text)?;
        tracing::info!(path = %path.display(), "Loaded server config");
        Ok(config)
    }

    /// Wall-clock length of a timer after scaling.
    #[must_use]
    pub fn timer_duration(&self, duration_ms: u64) -> Duration {
        let scale = if self.time_scale.is_finite() {
            self.time_scale.max(0.0)
        } else {
            1.0
        };
        Duration::from_secs_f64(duration_ms as f64 * scale / 1000.0)
    }

    /// Load the configured catalog.
    pub fn catalog(&self) -> Result<Arc<Catalog>> {
        let catalog = match &self.catalog_path {
            Some(path) => {
                let text = read(path)?;
                Catalog::from_ron(&path.display().to_string(), &text)?
            }
            None => Catalog::builtin()?,
        };
        Ok(Arc::new(catalog))
    }

    /// Economy over `catalog` with this config's tunables.
    #[must_use]
    pub fn economy(&self, catalog: Arc<Catalog>) -> Arc<BasicEconomy> {
        Arc::new(BasicEconomy::new(catalog, self.economy.clone()))
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ServerError::Io {
        path: path.to_path_buf(),
        source,
    })
}
