//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use crate::errors::HubError;
use crate::routes::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub room_count: usize,
    pub connection_count: usize,
}

/// `GET /v1/health`
///
/// Pings the repository and queries the hub; either failing turns into a
/// 503 via `HubError::ServiceUnavailable`.
#[instrument(skip_all, name = "hub.health")]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, HubError> {
    state
        .repo
        .ping()
        .await
        .map_err(|e| HubError::ServiceUnavailable(format!("repository ping failed: {e}")))?;

    let status = state
        .hub
        .status()
        .await
        .map_err(|e| HubError::ServiceUnavailable(format!("hub unavailable: {e}")))?;

    Ok(Json(HealthResponse {
        status: "healthy",
        room_count: status.room_count,
        connection_count: status.connection_count,
    }))
}
