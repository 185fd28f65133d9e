//! In-memory session repository.
//!
//! Used by tests and as the startup fallback when no database is
//! configured or Postgres is unreachable. Same semantics as the Postgres
//! implementation, minus durability.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{hash_password, verify_password, SessionRepository, StoredSession};
use crate::errors::HubError;
use crate::protocol::SpinValue;

/// Map-backed repository guarded by an async `RwLock`.
#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemorySessionRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn get_session(&self, key: &str) -> Result<Option<StoredSession>, HubError> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn create_or_get_session(
        &self,
        key: &str,
        password: Option<&str>,
    ) -> Result<StoredSession, HubError> {
        let mut sessions = self.sessions.write().await;

        if let Some(session) = sessions.get_mut(key) {
            // Adopt a password onto an unprotected room; never overwrite
            if session.password_hash.is_none() {
                if let Some(password) = password.filter(|p| !p.is_empty()) {
                    session.password_hash = Some(hash_password(password)?);
                    session.updated_at = Utc::now();
                }
            }
            return Ok(session.clone());
        }

        let now = Utc::now();
        let session = StoredSession {
            key: key.to_string(),
            history: Vec::new(),
            password_hash: password
                .filter(|p| !p.is_empty())
                .map(hash_password)
                .transpose()?,
            created_at: now,
            updated_at: now,
        };
        sessions.insert(key.to_string(), session.clone());
        Ok(session)
    }

    async fn validate_password(&self, key: &str, password: &str) -> Result<bool, HubError> {
        let sessions = self.sessions.read().await;
        match sessions.get(key) {
            None => Ok(password.is_empty()),
            Some(session) => match &session.password_hash {
                None => Ok(true),
                Some(hash) => verify_password(password, hash),
            },
        }
    }

    async fn append_number(&self, key: &str, value: &SpinValue) -> Result<usize, HubError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| HubError::NotFound("Session".to_string()))?;

        session.history.push(value.clone());
        session.updated_at = Utc::now();
        Ok(session.history.len())
    }

    async fn remove_number(&self, key: &str, index: usize) -> Result<usize, HubError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| HubError::NotFound("Session".to_string()))?;

        if index >= session.history.len() {
            return Err(HubError::BadRequest(format!(
                "History index {index} is out of range"
            )));
        }

        session.history.remove(index);
        session.updated_at = Utc::now();
        Ok(session.history.len())
    }

    async fn replace_history(&self, key: &str, history: Vec<SpinValue>) -> Result<(), HubError> {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();

        match sessions.get_mut(key) {
            Some(session) => {
                session.history = history;
                session.updated_at = now;
            }
            None => {
                sessions.insert(
                    key.to_string(),
                    StoredSession {
                        key: key.to_string(),
                        history,
                        password_hash: None,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }
        Ok(())
    }

    async fn all_sessions(&self) -> Result<Vec<StoredSession>, HubError> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<StoredSession> = sessions.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }

    async fn ping(&self) -> Result<(), HubError> {
        Ok(())
    }
}
