//! Liveness endpoint

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::server::AppState;

/// Health report for operators and load balancers
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the process is serving
    pub status: &'static str,
    /// Upstream provider in use (`http` or `simulated`)
    pub provider: &'static str,
    /// Whether stream requests can currently succeed
    pub credential_configured: bool,
    /// Seconds since the server started
    pub uptime_secs: u64,
}

/// Reports process health. Never contacts the upstream provider.
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        provider: state.relay.provider_type(),
        credential_configured: state.relay.credential_configured(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
