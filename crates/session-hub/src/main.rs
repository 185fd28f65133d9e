//! Session Hub
//!
//! Entry point for the Spinboard real-time broadcast service. Serves the
//! WebSocket hub, room REST endpoints and the admin console API.

use std::net::SocketAddr;
use std::sync::Arc;

use common::secret::ExposeSecret;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use session_hub::actors::hub::HubHandle;
use session_hub::auth::AuthGate;
use session_hub::config::Config;
use session_hub::registry::SessionRegistry;
use session_hub::repositories::{
    MemorySessionRepository, PostgresSessionRepository, SessionRepository,
};
use session_hub::routes::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Session Hub");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        send_queue_capacity = config.send_queue_capacity,
        "Configuration loaded successfully"
    );

    // Connect to Postgres, falling back to in-memory storage so the hub
    // stays usable without a database (histories just won't survive a
    // restart).
    let repo: Arc<dyn SessionRepository> = match &config.database_url {
        Some(url) => match PostgresSessionRepository::connect(url.expose_secret()).await {
            Ok(repo) => {
                info!("Database connection established");
                Arc::new(repo)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Database unavailable, falling back to in-memory session storage"
                );
                Arc::new(MemorySessionRepository::new())
            }
        },
        None => {
            info!("No DATABASE_URL configured, using in-memory session storage");
            Arc::new(MemorySessionRepository::new())
        }
    };

    // Spawn the hub coordinator
    let hub = HubHandle::new();
    let auth = AuthGate::new(config.token_secret.clone());

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState {
        repo,
        hub: hub.clone(),
        registry: Arc::new(SessionRegistry::new()),
        auth,
        config,
    });

    let app = routes::build_routes(state);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Session Hub listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Cancelling the hub propagates to every connection's child token
    hub.cancel();

    info!("Session Hub shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
