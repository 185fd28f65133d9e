//! Message types for the hub coordinator mailbox.
//!
//! All hub state changes flow through [`HubMessage`]; the single mailbox
//! gives membership changes and broadcasts a total order. Queries reply
//! through oneshot channels.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::protocol::Envelope;

/// A room member as the hub sees it: an id, an outbound frame queue, and
/// the cancellation token that tears the connection down.
#[derive(Debug, Clone)]
pub struct MemberHandle {
    /// Connection id (UUID v4, assigned at upgrade time).
    pub connection_id: String,

    /// Bounded outbound queue feeding the connection's write loop.
    /// Frames are pre-serialized and shared across members.
    pub sender: mpsc::Sender<Arc<str>>,

    /// Cancelling this token shuts down both connection loops.
    pub cancel: CancellationToken,
}

/// Messages processed by the hub coordinator.
#[derive(Debug)]
pub enum HubMessage {
    /// Add a member to a room. A member already registered elsewhere is
    /// moved; a connection belongs to at most one room.
    Register { key: String, member: MemberHandle },

    /// Remove a member wherever it is registered. Idempotent.
    Unregister { connection_id: String },

    /// Serialize the envelope once and fan it out to every member of the
    /// room. Members whose queues are full or closed are evicted inline.
    Broadcast { key: String, envelope: Envelope },

    /// Admin-triggered eviction. Replies with whether the connection was
    /// found in the routing table.
    Evict {
        connection_id: String,
        respond_to: oneshot::Sender<bool>,
    },

    /// Current room/connection counts.
    GetStatus { respond_to: oneshot::Sender<HubStatus> },
}

/// Hub status snapshot, used by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStatus {
    /// Rooms with at least one member.
    pub room_count: usize,

    /// Registered connections across all rooms.
    pub connection_count: usize,
}
