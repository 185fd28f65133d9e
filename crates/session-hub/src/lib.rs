//! Spinboard session hub.
//!
//! Rooms are keyed by a session key. Every WebSocket member of a room sees
//! the same running list of spin values; one member's `add` or `remove` is
//! persisted and then fanned out to every member of that room.
//!
//! Architecture:
//! - One hub coordinator actor serializes membership and broadcast over a
//!   single mailbox.
//! - Two tasks per connection (read loop, write loop) joined by a bounded
//!   outbound queue; a slow consumer's full queue gets that consumer
//!   evicted, never the room stalled.
//! - An introspection registry feeds the admin console with deep-copy
//!   snapshots.

pub mod actors;
pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod repositories;
pub mod routes;
pub mod ws;
