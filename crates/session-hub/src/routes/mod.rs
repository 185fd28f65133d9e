//! HTTP routes for the session hub.
//!
//! Defines the Axum router and application state. The REST routes get
//! trace and timeout layers; the WebSocket upgrade route gets neither,
//! since connections are long-lived.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::actors::hub::HubHandle;
use crate::auth::AuthGate;
use crate::config::Config;
use crate::handlers;
use crate::registry::SessionRegistry;
use crate::repositories::SessionRepository;
use crate::ws;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session storage (Postgres or in-memory fallback).
    pub repo: Arc<dyn SessionRepository>,

    /// Handle to the hub coordinator.
    pub hub: HubHandle,

    /// Introspection registry behind the admin console.
    pub registry: Arc<SessionRegistry>,

    /// Room-token gate.
    pub auth: AuthGate,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// - `/ws` — WebSocket upgrade (no timeout layer)
/// - `/v1/rooms/*` — token minting and history access
/// - `/v1/admin/*` — console snapshot, stats, eviction
/// - `/v1/health` — repository ping + hub status
pub fn build_routes(state: Arc<AppState>) -> Router {
    let rest_routes = Router::new()
        .route("/v1/health", get(handlers::health::health_check))
        .route("/v1/rooms/auth", post(handlers::rooms::authenticate_room))
        .route(
            "/v1/rooms/:key/history",
            get(handlers::rooms::get_history).put(handlers::rooms::put_history),
        )
        .route("/v1/admin/sessions", get(handlers::admin::list_sessions))
        .route("/v1/admin/stats", get(handlers::admin::stats))
        .route(
            "/v1/admin/sessions/:key/history",
            get(handlers::admin::session_history),
        )
        .route(
            "/v1/admin/connections/:id/disconnect",
            post(handlers::admin::disconnect_connection),
        )
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let ws_routes = Router::new().route("/ws", get(ws::ws_upgrade));

    Router::new()
        .merge(ws_routes)
        .merge(rest_routes)
        .with_state(state)
}
