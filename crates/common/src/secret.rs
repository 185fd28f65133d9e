//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] crate types used throughout Spinboard. Any
//! struct that derives `Debug` while holding a `SecretString` automatically
//! redacts the value, so secrets cannot leak through `{:?}` formatting or
//! tracing fields.
//!
//! Secrets are zeroized on drop, and the inner value is only reachable
//! through an explicit [`ExposeSecret::expose_secret`] call.
//!
//! Use `SecretString` for the database URL, the room-token signing secret
//! and any password handled in memory; use `SecretBox<T>` for non-string
//! secret material.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
