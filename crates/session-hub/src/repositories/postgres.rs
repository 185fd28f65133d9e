//! Postgres-backed session repository.
//!
//! Histories live in a JSONB column, so append and index-removal are
//! single-statement operations and the returned `jsonb_array_length` is
//! the post-mutation version counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::instrument;

use super::{hash_password, verify_password, SessionRepository, StoredSession};
use crate::errors::HubError;
use crate::protocol::SpinValue;

/// Connection acquire timeout for the pool.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum pool connections.
const MAX_CONNECTIONS: u32 = 5;

#[derive(sqlx::FromRow)]
struct SessionRow {
    key: String,
    password_hash: Option<String>,
    history: Json<Vec<SpinValue>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for StoredSession {
    fn from(row: SessionRow) -> Self {
        StoredSession {
            key: row.key,
            history: row.history.0,
            password_hash: row.password_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres repository over a shared connection pool.
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    /// Connect, verify liveness and run embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Repository` if the pool cannot connect or a
    /// migration fails. Callers fall back to the in-memory repository.
    pub async fn connect(database_url: &str) -> Result<Self, HubError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| HubError::Repository(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionRepository for PostgresSessionRepository {
    #[instrument(skip_all, fields(room_key = %key))]
    async fn get_session(&self, key: &str) -> Result<Option<StoredSession>, HubError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r"
            SELECT key, password_hash, history, created_at, updated_at
            FROM room_sessions
            WHERE key = $1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredSession::from))
    }

    #[instrument(skip_all, fields(room_key = %key))]
    async fn create_or_get_session(
        &self,
        key: &str,
        password: Option<&str>,
    ) -> Result<StoredSession, HubError> {
        let password_hash = password
            .filter(|p| !p.is_empty())
            .map(hash_password)
            .transpose()?;

        // COALESCE keeps an existing password; a new one is only adopted
        // by a previously unprotected room.
        let row: SessionRow = sqlx::query_as(
            r"
            INSERT INTO room_sessions (key, password_hash)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
            SET password_hash = COALESCE(room_sessions.password_hash, EXCLUDED.password_hash),
                updated_at = now()
            RETURNING key, password_hash, history, created_at, updated_at
            ",
        )
        .bind(key)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    #[instrument(skip_all, fields(room_key = %key))]
    async fn validate_password(&self, key: &str, password: &str) -> Result<bool, HubError> {
        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT password_hash FROM room_sessions WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match stored {
            None => Ok(password.is_empty()),
            Some(None) => Ok(true),
            Some(Some(hash)) => verify_password(password, &hash),
        }
    }

    #[instrument(skip_all, fields(room_key = %key))]
    async fn append_number(&self, key: &str, value: &SpinValue) -> Result<usize, HubError> {
        let new_len: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE room_sessions
            SET history = history || $2::jsonb, updated_at = now()
            WHERE key = $1
            RETURNING jsonb_array_length(history)
            ",
        )
        .bind(key)
        .bind(Json(value))
        .fetch_optional(&self.pool)
        .await?;

        let new_len = new_len.ok_or_else(|| HubError::NotFound("Session".to_string()))?;
        usize::try_from(new_len).map_err(|_| HubError::Internal)
    }

    #[instrument(skip_all, fields(room_key = %key, index = index))]
    async fn remove_number(&self, key: &str, index: usize) -> Result<usize, HubError> {
        let index = i32::try_from(index).map_err(|_| {
            HubError::BadRequest(format!("History index {index} is out of range"))
        })?;

        let new_len: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE room_sessions
            SET history = history - $2::int, updated_at = now()
            WHERE key = $1 AND jsonb_array_length(history) > $2
            RETURNING jsonb_array_length(history)
            ",
        )
        .bind(key)
        .bind(index)
        .fetch_optional(&self.pool)
        .await?;

        match new_len {
            Some(len) => usize::try_from(len).map_err(|_| HubError::Internal),
            // Distinguish a missing room from a bad index
            None => {
                if self.get_session(key).await?.is_some() {
                    Err(HubError::BadRequest(format!(
                        "History index {index} is out of range"
                    )))
                } else {
                    Err(HubError::NotFound("Session".to_string()))
                }
            }
        }
    }

    #[instrument(skip_all, fields(room_key = %key, entries = history.len()))]
    async fn replace_history(&self, key: &str, history: Vec<SpinValue>) -> Result<(), HubError> {
        sqlx::query(
            r"
            INSERT INTO room_sessions (key, history)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE
            SET history = EXCLUDED.history, updated_at = now()
            ",
        )
        .bind(key)
        .bind(Json(history))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all)]
    async fn all_sessions(&self) -> Result<Vec<StoredSession>, HubError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r"
            SELECT key, password_hash, history, created_at, updated_at
            FROM room_sessions
            ORDER BY key
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StoredSession::from).collect())
    }

    #[instrument(skip_all)]
    async fn ping(&self) -> Result<(), HubError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
