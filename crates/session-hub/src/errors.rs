//! Session hub error types.
//!
//! One taxonomy serves both surfaces: WebSocket connections get a
//! client-safe `error`/`authRequired` envelope, REST handlers get an HTTP
//! status with a JSON body via `IntoResponse`. Internal details are logged
//! server-side and never sent to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::protocol::Envelope;

/// Session hub error type.
///
/// Maps to HTTP status codes on the REST surface:
/// - Repository, Internal: 500 Internal Server Error
/// - Unauthorized, InvalidToken: 401 Unauthorized
/// - NotFound: 404 Not Found
/// - Protocol, BadRequest: 400 Bad Request
/// - ServiceUnavailable: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum HubError {
    /// Malformed or out-of-sequence client frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Room is protected and the presented credentials do not grant access.
    #[error("Unauthorized for room: {0}")]
    Unauthorized(String),

    /// Bearer token failed verification.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Persisted-state operation failed.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid REST request payload.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Hub or repository is unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal error.
    #[error("Internal error")]
    Internal,
}

impl HubError {
    /// Returns a client-safe message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            HubError::Protocol(msg) | HubError::BadRequest(msg) => msg.clone(),
            HubError::Unauthorized(_) => "Not authorized for this room".to_string(),
            HubError::InvalidToken(_) => "Invalid or expired token".to_string(),
            HubError::Repository(_) | HubError::Internal => {
                "An internal error occurred".to_string()
            }
            HubError::NotFound(resource) => format!("{resource} not found"),
            HubError::ServiceUnavailable(_) => "Service temporarily unavailable".to_string(),
        }
    }

    /// Returns the WebSocket envelope reporting this error to a client.
    ///
    /// Auth failures become `authRequired` so the client can prompt for
    /// credentials; everything else becomes a generic `error` frame.
    #[must_use]
    pub fn to_envelope(&self, room_key: Option<&str>) -> Envelope {
        match self {
            HubError::Unauthorized(_) | HubError::InvalidToken(_) => Envelope::AuthRequired {
                key: room_key.map(ToString::to_string),
            },
            _ => Envelope::Error {
                error: self.client_message(),
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            HubError::Repository(err) => {
                tracing::error!(target: "hub.repository", error = %err, "Repository operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "REPOSITORY_ERROR")
            }
            HubError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            HubError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            HubError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            HubError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            HubError::Protocol(_) | HubError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            HubError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "hub.availability", reason = %reason, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for HubError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => HubError::NotFound("Session".to_string()),
            other => HubError::Repository(other.to_string()),
        }
    }
}

impl From<common::jwt::TokenError> for HubError {
    fn from(err: common::jwt::TokenError) -> Self {
        HubError::InvalidToken(err.to_string())
    }
}
