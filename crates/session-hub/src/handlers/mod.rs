//! REST handlers: room auth/history, admin console, health.

pub mod admin;
pub mod health;
pub mod rooms;
