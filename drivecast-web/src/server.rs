//! HTTP server for the drivecast relay
//!
//! One media route plus a health route. The relay is built once at startup
//! and shared read-only by every request task.

use std::time::Instant;

use axum::Router;
use axum::routing::get;
use drivecast_core::config::DrivecastConfig;
use drivecast_core::{RuntimeMode, StreamRelay, build_relay};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::handlers::{health, stream_file};

/// Path of the media endpoint.
pub const STREAM_ROUTE: &str = "/api/stream";

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Stateless relay shared by all request tasks
    pub relay: StreamRelay,
    /// Server start time, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Creates state around an already built relay.
    pub fn new(relay: StreamRelay) -> Self {
        Self {
            relay,
            started_at: Instant::now(),
        }
    }
}

/// Builds the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // GET routes also answer HEAD, which players use to probe
        .route(STREAM_ROUTE, get(stream_file))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the relay server until Ctrl-C.
///
/// # Errors
///
/// - `DrivecastError::Provider` - If the upstream provider cannot be constructed
/// - `DrivecastError::Io` - If the listener cannot bind or the server fails
pub async fn run_server(config: DrivecastConfig, mode: RuntimeMode) -> drivecast_core::Result<()> {
    let relay = build_relay(&config, mode)?;

    info!(
        "Starting drivecast in {} mode (provider: {})",
        mode,
        relay.provider_type()
    );
    if relay.credential_configured() {
        info!("API key configured: yes");
    } else {
        warn!(
            "API key configured: no - stream requests will fail until {} is set",
            drivecast_core::config::API_KEY_VAR
        );
    }

    let app = build_router(AppState::new(relay));

    let listener = tokio::net::TcpListener::bind(config.server.bind_address()).await?;
    let addr = listener.local_addr()?;
    info!("Drivecast relay running on http://{}", addr);
    info!("Test endpoint: http://{}{}?id=YOUR_FILE_ID", addr, STREAM_ROUTE);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Drivecast relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining connections"),
        Err(e) => {
            warn!("Unable to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
