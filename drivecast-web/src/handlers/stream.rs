//! Media streaming endpoint
//!
//! Adapts inbound HTTP requests into relay requests. All protocol decisions
//! (status, header translation, body relay) live in the relay itself.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method};
use drivecast_core::{RelayError, RelayRequest, RelayResponse};
use serde::Deserialize;

use super::range::extract_range_header;
use crate::server::AppState;

/// Query parameters for streaming requests
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// File id or share link
    pub id: Option<String>,
}

/// Streams a drive file, honouring `Range` for seeking.
///
/// Serves both GET and HEAD; HEAD answers with the same status and headers
/// and no body.
///
/// # Errors
///
/// Returns the relay's error response: 400 for a missing or invalid id,
/// 500 when no credential is configured, the upstream status for upstream
/// failures.
pub async fn stream_file(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<RelayResponse, RelayError> {
    let request = RelayRequest {
        id: query.id,
        range: extract_range_header(&headers),
        head_only: method == Method::HEAD,
    };

    state.relay.handle(request).await
}
