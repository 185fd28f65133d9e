//! Room endpoints: token minting and history fetch/replace.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::errors::HubError;
use crate::protocol::SpinValue;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub key: String,
    /// Plaintext room password; redacted in Debug output.
    #[serde(default)]
    pub password: Option<SecretString>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Serialize, Deserialize)]
pub struct HistoryBody {
    pub history: Vec<SpinValue>,
}

/// `POST /v1/rooms/auth`
///
/// Creates the room if absent (hashing the password when one is given),
/// validates the password when the room is protected, and mints a room
/// token either way.
#[instrument(skip_all, name = "hub.rooms.auth")]
pub async fn authenticate_room(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuthRequest>,
) -> Result<Json<AuthResponse>, HubError> {
    if request.key.is_empty() {
        return Err(HubError::BadRequest("Room key is required".to_string()));
    }

    let password = request.password.as_ref().map(|p| p.expose_secret());
    let existing = state.repo.get_session(&request.key).await?;

    match existing {
        Some(session) if session.has_password() => {
            let presented = password.unwrap_or_default();
            if !state
                .repo
                .validate_password(&request.key, presented)
                .await?
            {
                return Err(HubError::Unauthorized(request.key.clone()));
            }
        }
        _ => {
            // Creates the room, adopting a password onto an open one
            state
                .repo
                .create_or_get_session(&request.key, password)
                .await?;
        }
    }

    let token = state.auth.issue(&request.key)?;

    info!(target: "hub.rooms", room_key = %request.key, "Room token issued");

    Ok(Json(AuthResponse { token }))
}

/// `GET /v1/rooms/:key/history`
///
/// Unknown rooms return an empty history rather than an error.
#[instrument(skip_all, name = "hub.rooms.get_history", fields(room_key = %key))]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<HistoryBody>, HubError> {
    let history = state
        .repo
        .get_session(&key)
        .await?
        .map(|session| session.history)
        .unwrap_or_default();

    Ok(Json(HistoryBody { history }))
}

/// `PUT /v1/rooms/:key/history`
///
/// Replaces the stored history after validating every entry.
#[instrument(skip_all, name = "hub.rooms.put_history", fields(room_key = %key))]
pub async fn put_history(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<HistoryBody>,
) -> Result<Json<HistoryBody>, HubError> {
    if body.history.iter().any(|value| !value.is_valid()) {
        return Err(HubError::BadRequest(
            "History contains an invalid wheel number".to_string(),
        ));
    }

    state
        .repo
        .replace_history(&key, body.history.clone())
        .await?;

    Ok(Json(body))
}
