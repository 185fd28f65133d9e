//! Actor layer: the hub coordinator and its message types.

pub mod hub;
pub mod messages;
