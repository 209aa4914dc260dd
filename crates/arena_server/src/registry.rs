//! Running rooms by id.

use std::collections::BTreeMap;
use std::sync::Arc;

use arena_core::catalog::Catalog;
use arena_core::services::{Economy, StatProvider};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::protocol::Envelope;
use crate::room_task::{spawn_room, RoomHandle};

struct RoomEntry {
    handle: RoomHandle,
    task: JoinHandle<()>,
    token: CancellationToken,
}

/// Owns every room task of a server.
///
/// All rooms share one catalog, one economy and one outbound channel.
/// Cancelling the registry's token stops every room.
pub struct RoomRegistry {
    config: Arc<ServerConfig>,
    catalog: Arc<Catalog>,
    economy: Arc<dyn Economy>,
    outbound: mpsc::UnboundedSender<Envelope>,
    shutdown: CancellationToken,
    rooms: BTreeMap<String, RoomEntry>,
}

impl RoomRegistry {
    /// Registry using the configured catalog.
    pub fn new(config: ServerConfig, outbound: mpsc::UnboundedSender<Envelope>) -> Result<Self> {
        let catalog = config.catalog()?;
        let economy = config.economy(Arc::clone(&catalog));
        Ok(Self {
            config: Arc::new(config),
            catalog,
            economy,
            outbound,
            shutdown: CancellationToken::new(),
            rooms: BTreeMap::new(),
        })
    }

    /// Driver configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawn a new room.
    pub fn create_room(&mut self, room_id: &str, seed: u64) -> Result<RoomHandle> {
        self.prune();
        if self.rooms.contains_key(room_id) {
            return Err(ServerError::RoomExists(room_id.to_string()));
        }
        let token = self.shutdown.child_token();
        let (handle, task) = spawn_room(
            room_id,
            seed,
            Arc::clone(&self.config),
            Arc::clone(&self.catalog) as Arc<dyn StatProvider>,
            Arc::clone(&self.economy),
            self.outbound.clone(),
            token.clone(),
        );
        info!(room = %room_id, seed, "Room created");
        self.rooms.insert(
            room_id.to_string(),
            RoomEntry {
                handle: handle.clone(),
                task,
                token,
            },
        );
        Ok(handle)
    }

    /// Handle to a running room.
    pub fn get(&self, room_id: &str) -> Result<RoomHandle> {
        self.rooms
            .get(room_id)
            .filter(|entry| !entry.handle.is_closed())
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| ServerError::RoomNotFound(room_id.to_string()))
    }

    /// Ids of registered rooms.
    #[must_use]
    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Drop rooms whose task has stopped. Returns the removed ids.
    pub fn prune(&mut self) -> Vec<String> {
        let closed: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, entry)| entry.task.is_finished() || entry.handle.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &closed {
            self.rooms.remove(id);
            info!(room = %id, "Room removed");
        }
        closed
    }

    /// Stop one room and wait for its task.
    pub async fn close_room(&mut self, room_id: &str) -> Result<()> {
        let entry = self
            .rooms
            .remove(room_id)
            .ok_or_else(|| ServerError::RoomNotFound(room_id.to_string()))?;
        entry.token.cancel();
        if let Err(err) = entry.task.await {
            warn!(room = %room_id, %err, "Room task failed");
        }
        Ok(())
    }

    /// Stop every room and wait for their tasks.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for (id, entry) in self.rooms {
            if let Err(err) = entry.task.await {
                warn!(room = %id, %err, "Room task failed");
            }
        }
        info!("All rooms stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (RoomRegistry, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            RoomRegistry::new(ServerConfig::default(), tx).expect("builtin catalog"),
            rx,
        )
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_rooms() {
        let (mut registry, _rx) = registry();
        registry.create_room("a", 1).expect("new room");
        assert!(matches!(
            registry.create_room("a", 2),
            Err(ServerError::RoomExists(_))
        ));
        assert!(matches!(registry.get("b"), Err(ServerError::RoomNotFound(_))));
        assert_eq!(registry.room_ids(), vec!["a"]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_emptied_room_is_pruned() {
        let (mut registry, _rx) = registry();
        let handle = registry.create_room("a", 1).expect("new room");
        registry.create_room("b", 2).expect("new room");
        handle.join("p0", "Ada").await.expect("joins");
        handle.leave("p0").await.expect("leaves");

        while !handle.is_closed() {
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.prune(), vec!["a"]);
        assert_eq!(registry.room_ids(), vec!["b"]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_close_room() {
        let (mut registry, _rx) = registry();
        let handle = registry.create_room("a", 1).expect("new room");
        registry.close_room("a").await.expect("running");
        assert!(handle.is_closed());
        assert!(matches!(
            registry.close_room("a").await,
            Err(ServerError::RoomNotFound(_))
        ));
        registry.shutdown().await;
    }
}
