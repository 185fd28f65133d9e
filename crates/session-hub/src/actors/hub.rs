//! Hub coordinator: the single task that owns room membership.
//!
//! The coordinator drains one mailbox, so register/unregister/broadcast/
//! evict are totally ordered; a broadcast submitted after a register fans
//! out to the new member, and never to one already unregistered.
//!
//! Fan-out policy: the frame is serialized once and `try_send` delivers it
//! to every member without awaiting. A member whose queue is full or
//! closed is evicted on the spot, so one slow consumer costs itself the
//! connection and costs the room nothing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::messages::{HubMessage, HubStatus, MemberHandle};
use crate::errors::HubError;
use crate::protocol::Envelope;

/// Channel buffer size for the hub mailbox.
const HUB_CHANNEL_BUFFER: usize = 1000;

/// Handle to the hub coordinator.
///
/// Cheap to clone; all methods go through the coordinator mailbox.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubMessage>,
    cancel_token: CancellationToken,
}

impl HubHandle {
    /// Spawn the hub coordinator task and return a handle to it.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(HUB_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = HubActor::new(receiver, cancel_token.clone());
        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Register a member into a room.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the hub mailbox is closed.
    pub async fn register(&self, key: String, member: MemberHandle) -> Result<(), HubError> {
        self.sender
            .send(HubMessage::Register { key, member })
            .await
            .map_err(|_| HubError::Internal)
    }

    /// Remove a connection from whatever room it is in. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the hub mailbox is closed.
    pub async fn unregister(&self, connection_id: String) -> Result<(), HubError> {
        self.sender
            .send(HubMessage::Unregister { connection_id })
            .await
            .map_err(|_| HubError::Internal)
    }

    /// Broadcast an envelope to every member of a room.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the hub mailbox is closed.
    pub async fn broadcast(&self, key: String, envelope: Envelope) -> Result<(), HubError> {
        self.sender
            .send(HubMessage::Broadcast { key, envelope })
            .await
            .map_err(|_| HubError::Internal)
    }

    /// Evict a connection. Returns whether the routing table knew it.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the hub mailbox is closed or the
    /// reply channel is dropped.
    pub async fn evict(&self, connection_id: String) -> Result<bool, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubMessage::Evict {
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| HubError::Internal)?;

        rx.await.map_err(|_| HubError::Internal)
    }

    /// Current room/connection counts.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Internal` if the hub mailbox is closed or the
    /// reply channel is dropped.
    pub async fn status(&self) -> Result<HubStatus, HubError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(HubMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|_| HubError::Internal)?;

        rx.await.map_err(|_| HubError::Internal)
    }

    /// Cancel the hub coordinator (shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Get a child token for spawning connection actors.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for HubHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Room membership, owned exclusively by the hub coordinator task.
///
/// Kept as its own type so the overflow-eviction fan-out policy is
/// testable without sockets or a running actor.
#[derive(Default)]
pub struct RoutingTable {
    /// Members per room key.
    rooms: HashMap<String, HashMap<String, MemberHandle>>,

    /// Reverse index: connection id to room key.
    room_of: HashMap<String, String>,
}

impl RoutingTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member into a room, moving it if it is already registered
    /// in another room. A connection belongs to at most one room.
    pub fn insert(&mut self, key: &str, member: MemberHandle) {
        if let Some(previous_key) = self.room_of.get(&member.connection_id).cloned() {
            if previous_key != key {
                self.remove(&member.connection_id);
            }
        }

        self.room_of
            .insert(member.connection_id.clone(), key.to_string());
        self.rooms
            .entry(key.to_string())
            .or_default()
            .insert(member.connection_id.clone(), member);
    }

    /// Remove a connection wherever it is registered. Prunes the member
    /// set when it empties. Returns the removed member, if any.
    pub fn remove(&mut self, connection_id: &str) -> Option<MemberHandle> {
        let key = self.room_of.remove(connection_id)?;
        let members = self.rooms.get_mut(&key)?;
        let removed = members.remove(connection_id);
        if members.is_empty() {
            self.rooms.remove(&key);
        }
        removed
    }

    /// Deliver a pre-serialized frame to every member of a room.
    ///
    /// Uses `try_send` so delivery never awaits. Members whose queues are
    /// full or closed are removed from the table and returned so the
    /// caller can cancel their connections.
    pub fn fan_out(&mut self, key: &str, frame: &Arc<str>) -> Vec<MemberHandle> {
        let Some(members) = self.rooms.get(key) else {
            return Vec::new();
        };

        let mut evicted_ids = Vec::new();
        for (connection_id, member) in members {
            if member.sender.try_send(Arc::clone(frame)).is_err() {
                evicted_ids.push(connection_id.clone());
            }
        }

        evicted_ids
            .iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }

    /// Room key a connection is registered under, if any.
    #[must_use]
    pub fn room_of(&self, connection_id: &str) -> Option<&str> {
        self.room_of.get(connection_id).map(String::as_str)
    }

    /// Rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Registered connections across all rooms.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.room_of.len()
    }
}

/// The hub coordinator implementation.
///
/// Owns the routing table and runs the mailbox loop.
struct HubActor {
    receiver: mpsc::Receiver<HubMessage>,
    cancel_token: CancellationToken,
    table: RoutingTable,
}

impl HubActor {
    fn new(receiver: mpsc::Receiver<HubMessage>, cancel_token: CancellationToken) -> Self {
        Self {
            receiver,
            cancel_token,
            table: RoutingTable::new(),
        }
    }

    /// Run the coordinator message loop.
    #[instrument(skip_all, name = "hub.actor")]
    async fn run(mut self) {
        info!(target: "hub.actor", "Hub coordinator started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "hub.actor", "Hub coordinator received cancellation signal");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(target: "hub.actor", "Hub coordinator mailbox closed, exiting");
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "hub.actor",
            rooms_remaining = self.table.room_count(),
            connections_remaining = self.table.connection_count(),
            "Hub coordinator stopped"
        );
    }

    fn handle_message(&mut self, message: HubMessage) {
        match message {
            HubMessage::Register { key, member } => {
                debug!(
                    target: "hub.actor",
                    room_key = %key,
                    connection_id = %member.connection_id,
                    "Registering member"
                );
                self.table.insert(&key, member);
            }

            HubMessage::Unregister { connection_id } => {
                if self.table.remove(&connection_id).is_some() {
                    debug!(
                        target: "hub.actor",
                        connection_id = %connection_id,
                        "Unregistered member"
                    );
                }
            }

            HubMessage::Broadcast { key, envelope } => {
                self.broadcast(&key, &envelope);
            }

            HubMessage::Evict {
                connection_id,
                respond_to,
            } => {
                let evicted = match self.table.remove(&connection_id) {
                    Some(member) => {
                        member.cancel.cancel();
                        info!(
                            target: "hub.actor",
                            connection_id = %connection_id,
                            "Evicted connection"
                        );
                        true
                    }
                    None => false,
                };
                let _ = respond_to.send(evicted);
            }

            HubMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(HubStatus {
                    room_count: self.table.room_count(),
                    connection_count: self.table.connection_count(),
                });
            }
        }
    }

    /// Serialize once, fan out, cancel anyone evicted for overflow.
    fn broadcast(&mut self, key: &str, envelope: &Envelope) {
        let frame: Arc<str> = match serde_json::to_string(envelope) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(
                    target: "hub.actor",
                    room_key = %key,
                    error = %e,
                    "Failed to serialize broadcast envelope, dropping"
                );
                return;
            }
        };

        for member in self.table.fan_out(key, &frame) {
            warn!(
                target: "hub.actor",
                room_key = %key,
                connection_id = %member.connection_id,
                "Member queue full or closed during broadcast, evicting"
            );
            member.cancel.cancel();
        }
    }
}
