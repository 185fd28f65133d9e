//! Admin console endpoints.
//!
//! Reads come from deep-copy registry snapshots enriched with persisted
//! history lengths; eviction goes through the hub mailbox so it is
//! atomic with respect to broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::{info, instrument};

use crate::errors::HubError;
use crate::registry::RoomSnapshot;
use crate::routes::AppState;

use super::rooms::HistoryBody;

/// One room as shown to the console: live connection state plus
/// persisted-history facts. The stored password never leaves the server;
/// only the protection flag does.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    #[serde(flatten)]
    pub room: RoomSnapshot,
    pub history_length: usize,
    pub password_protected: bool,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<AdminSession>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_sessions: usize,
    pub total_connections: usize,
    pub active_connections: usize,
    pub total_history_entries: usize,
    pub average_history_length: f64,
}

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub status: &'static str,
}

/// `GET /v1/admin/sessions`
#[instrument(skip_all, name = "hub.admin.sessions")]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionsResponse>, HubError> {
    let sessions = enriched_sessions(&state).await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// `GET /v1/admin/stats`
#[instrument(skip_all, name = "hub.admin.stats")]
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, HubError> {
    let sessions = enriched_sessions(&state).await?;

    let total_sessions = sessions.len();
    let total_connections = sessions.iter().map(|s| s.room.total_connections).sum();
    let active_connections = sessions.iter().map(|s| s.room.active_connections).sum();
    let total_history_entries: usize = sessions.iter().map(|s| s.history_length).sum();

    #[allow(clippy::cast_precision_loss)]
    let average_history_length = if total_sessions == 0 {
        0.0
    } else {
        total_history_entries as f64 / total_sessions as f64
    };

    Ok(Json(StatsResponse {
        total_sessions,
        total_connections,
        active_connections,
        total_history_entries,
        average_history_length,
    }))
}

/// `GET /v1/admin/sessions/:key/history`
#[instrument(skip_all, name = "hub.admin.history", fields(room_key = %key))]
pub async fn session_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<HistoryBody>, HubError> {
    let session = state
        .repo
        .get_session(&key)
        .await?
        .ok_or_else(|| HubError::NotFound("Session".to_string()))?;

    Ok(Json(HistoryBody {
        history: session.history,
    }))
}

/// `POST /v1/admin/connections/:id/disconnect`
///
/// Evicts through the hub mailbox (closing socket and queue), then drops
/// the introspection record.
#[instrument(skip_all, name = "hub.admin.disconnect", fields(connection_id = %connection_id))]
pub async fn disconnect_connection(
    State(state): State<Arc<AppState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<DisconnectResponse>, HubError> {
    let routed = state.hub.evict(connection_id.clone()).await?;
    let tracked = state.registry.remove_connection(&connection_id).await;

    if !routed && !tracked {
        return Err(HubError::NotFound("Connection".to_string()));
    }

    info!(
        target: "hub.admin",
        connection_id = %connection_id,
        "Connection disconnected by admin"
    );

    Ok(Json(DisconnectResponse {
        status: "disconnected",
    }))
}

/// Merge the live registry snapshot with persisted sessions. Rooms that
/// exist only in storage (created over REST, never joined) still show up.
async fn enriched_sessions(state: &AppState) -> Result<Vec<AdminSession>, HubError> {
    let snapshot = state.registry.snapshot().await;
    let stored = state.repo.all_sessions().await?;

    let mut stored_by_key: HashMap<String, crate::repositories::StoredSession> = stored
        .into_iter()
        .map(|s| (s.key.clone(), s))
        .collect();

    let mut sessions: Vec<AdminSession> = snapshot
        .into_iter()
        .map(|room| {
            let (history_length, password_protected) = stored_by_key
                .remove(&room.key)
                .map_or((0, false), |s| (s.history.len(), s.has_password()));
            AdminSession {
                room,
                history_length,
                password_protected,
            }
        })
        .collect();

    // Storage-only rooms: no live or historical connections yet
    for (key, stored) in stored_by_key {
        sessions.push(AdminSession {
            room: RoomSnapshot {
                key,
                created_at: stored.created_at,
                last_activity: stored.updated_at,
                active_connections: 0,
                total_connections: 0,
                connections: Vec::new(),
            },
            history_length: stored.history.len(),
            password_protected: stored.has_password(),
        });
    }

    sessions.sort_by(|a, b| a.room.key.cmp(&b.room.key));
    Ok(sessions)
}
