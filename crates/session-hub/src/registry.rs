//! Introspection registry: the read model behind the admin console.
//!
//! Connection actors record joins, activity and disconnects here; admin
//! handlers read deep-copy snapshots. This is deliberately a second
//! concurrency domain from the hub's routing table: it may lag a
//! broadcast by a moment, and the console tolerates that.
//!
//! Rooms are never pruned when their membership drops to zero; the
//! console keeps showing them until process restart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// Connection lifecycle state as shown to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// One tracked connection. Serialized straight into admin responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    pub id: String,
    pub key: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: ConnectionStatus,
    pub ip_address: String,
    pub user_agent: String,
}

/// Deep-copied view of one room, returned by [`SessionRegistry::snapshot`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active_connections: usize,
    pub total_connections: usize,
    pub connections: Vec<ConnectionRecord>,
}

struct RoomRecord {
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    /// Joins seen over the room's lifetime, including departed ones.
    total_connections: usize,
    connections: HashMap<String, ConnectionRecord>,
}

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<String, RoomRecord>,
    /// Reverse index: connection id to room key.
    room_of: HashMap<String, String>,
}

/// Registry of rooms and connections for the admin console.
#[derive(Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful join. Creates the room entry on first join.
    pub async fn record_join(&self, record: ConnectionRecord) {
        let mut state = self.state.write().await;
        let now = Utc::now();

        state
            .room_of
            .insert(record.id.clone(), record.key.clone());

        let room = state
            .rooms
            .entry(record.key.clone())
            .or_insert_with(|| RoomRecord {
                created_at: now,
                last_activity: now,
                total_connections: 0,
                connections: HashMap::new(),
            });

        room.last_activity = now;
        room.total_connections += 1;
        room.connections.insert(record.id.clone(), record);
    }

    /// Bump activity timestamps for a connection and its room.
    pub async fn touch(&self, connection_id: &str) {
        let mut state = self.state.write().await;
        let Some(key) = state.room_of.get(connection_id).cloned() else {
            return;
        };

        let now = Utc::now();
        if let Some(room) = state.rooms.get_mut(&key) {
            room.last_activity = now;
            if let Some(conn) = room.connections.get_mut(connection_id) {
                conn.last_activity = now;
            }
        }
    }

    /// Mark a connection disconnected, keeping its record visible.
    pub async fn mark_disconnected(&self, connection_id: &str) {
        let mut state = self.state.write().await;
        let Some(key) = state.room_of.get(connection_id).cloned() else {
            return;
        };

        if let Some(conn) = state
            .rooms
            .get_mut(&key)
            .and_then(|room| room.connections.get_mut(connection_id))
        {
            conn.status = ConnectionStatus::Disconnected;
            conn.last_activity = Utc::now();
        }
    }

    /// Drop a connection record entirely (admin eviction). The room entry
    /// stays even when this was its last connection. Returns whether the
    /// connection was known.
    pub async fn remove_connection(&self, connection_id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(key) = state.room_of.remove(connection_id) else {
            return false;
        };

        state
            .rooms
            .get_mut(&key)
            .and_then(|room| room.connections.remove(connection_id))
            .is_some()
    }

    /// Deep-copy snapshot of every room, sorted by key for stable output.
    pub async fn snapshot(&self) -> Vec<RoomSnapshot> {
        let state = self.state.read().await;

        let mut rooms: Vec<RoomSnapshot> = state
            .rooms
            .iter()
            .map(|(key, room)| {
                let mut connections: Vec<ConnectionRecord> =
                    room.connections.values().cloned().collect();
                connections.sort_by(|a, b| a.connected_at.cmp(&b.connected_at));

                RoomSnapshot {
                    key: key.clone(),
                    created_at: room.created_at,
                    last_activity: room.last_activity,
                    active_connections: connections
                        .iter()
                        .filter(|c| c.status == ConnectionStatus::Connected)
                        .count(),
                    total_connections: room.total_connections,
                    connections,
                }
            })
            .collect();

        rooms.sort_by(|a, b| a.key.cmp(&b.key));
        rooms
    }
}

/// Build a fresh connection record in the `connected` state.
#[must_use]
pub fn new_connection_record(
    connection_id: &str,
    key: &str,
    ip_address: String,
    user_agent: String,
) -> ConnectionRecord {
    let now = Utc::now();
    ConnectionRecord {
        id: connection_id.to_string(),
        key: key.to_string(),
        connected_at: now,
        last_activity: now,
        status: ConnectionStatus::Connected,
        ip_address,
        user_agent,
    }
}
