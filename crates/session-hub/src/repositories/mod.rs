//! Session persistence.
//!
//! `SessionRepository` is the storage contract behind rooms: keyed
//! histories plus an optional password hash. Two implementations exist,
//! Postgres for deployments and in-memory for tests and for fallback when
//! no database is reachable at startup.
//!
//! Passwords are stored as bcrypt hashes, never plaintext.

pub mod memory;
pub mod postgres;

pub use memory::MemorySessionRepository;
pub use postgres::PostgresSessionRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::HubError;
use crate::protocol::SpinValue;

/// A persisted room session.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub key: String,
    pub history: Vec<SpinValue>,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredSession {
    /// Whether joining this room requires a token.
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Storage contract for room sessions.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fetch a session by key.
    async fn get_session(&self, key: &str) -> Result<Option<StoredSession>, HubError>;

    /// Fetch a session, creating an empty one if absent. When `password`
    /// is provided and the existing session has none, the password is
    /// adopted; an existing password is never overwritten here.
    async fn create_or_get_session(
        &self,
        key: &str,
        password: Option<&str>,
    ) -> Result<StoredSession, HubError>;

    /// Check a plaintext password against the stored hash.
    ///
    /// Unknown rooms validate only against the empty password; rooms
    /// without a password accept anything.
    async fn validate_password(&self, key: &str, password: &str) -> Result<bool, HubError>;

    /// Append a value to the history. Returns the new history length.
    async fn append_number(&self, key: &str, value: &SpinValue) -> Result<usize, HubError>;

    /// Remove the entry at `index`. Returns the new history length.
    async fn remove_number(&self, key: &str, index: usize) -> Result<usize, HubError>;

    /// Replace the whole history, creating the session if absent.
    async fn replace_history(&self, key: &str, history: Vec<SpinValue>) -> Result<(), HubError>;

    /// All persisted sessions (admin console).
    async fn all_sessions(&self) -> Result<Vec<StoredSession>, HubError>;

    /// Storage liveness check (health endpoint).
    async fn ping(&self) -> Result<(), HubError>;
}

/// Hash a room password for storage.
pub(crate) fn hash_password(password: &str) -> Result<String, HubError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| HubError::Repository(e.to_string()))
}

/// Verify a plaintext password against a stored bcrypt hash.
pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool, HubError> {
    bcrypt::verify(password, hash).map_err(|e| HubError::Repository(e.to_string()))
}
