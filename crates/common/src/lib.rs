//! Common utilities shared across Spinboard components.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for room-token utilities (issuing, validation, claims)
pub mod jwt;
