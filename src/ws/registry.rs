use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::connection::ConnectionHandle;

/// Room membership for this process.
///
/// A room is the set of live connections for one project id. Rooms are
/// created implicitly by the first connection and pruned when the last
/// one leaves; an empty room is indistinguishable from an absent one.
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<String, HashMap<u64, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, handle: ConnectionHandle) {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(handle.project_id.clone()).or_default();
        room.insert(handle.conn_id, handle);
    }

    /// Remove a connection from its room. Returns false when the
    /// connection was already gone, so teardown side effects run once
    /// even if the close path races the heartbeat sweep.
    pub async fn remove(&self, project_id: &str, conn_id: u64) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(project_id) else {
            return false;
        };
        let removed = room.remove(&conn_id).is_some();
        if room.is_empty() {
            rooms.remove(project_id);
            debug!("Room {} emptied, pruned", project_id);
        }
        removed
    }

    /// Snapshot of a room's members.
    pub async fn members_of(&self, project_id: &str) -> Vec<ConnectionHandle> {
        let rooms = self.rooms.read().await;
        rooms
            .get(project_id)
            .map(|room| room.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every connection across all rooms.
    pub async fn connections(&self) -> Vec<ConnectionHandle> {
        let rooms = self.rooms.read().await;
        rooms
            .values()
            .flat_map(|room| room.values().cloned())
            .collect()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.rooms.read().await.values().map(|room| room.len()).sum()
    }
}
