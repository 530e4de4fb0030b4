//! Relay error taxonomy and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Every way a relay request can fail before its body starts streaming.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No `id` query parameter, or nothing left after extraction.
    #[error("Missing id")]
    MissingIdentifier,

    /// Identifier contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid id: {id}")]
    InvalidIdentifier { id: String },

    /// No provider credential in the deployment configuration.
    #[error("GOOGLE_API_KEY not configured")]
    MisconfiguredCredential,

    /// Metadata lookup answered non-2xx.
    #[error("File not found: {body}")]
    UpstreamNotFound {
        /// Upstream status, passed through to the client
        status: u16,
        /// Upstream error text
        body: String,
    },

    /// Media fetch answered non-2xx.
    #[error("Download failed: {body}")]
    UpstreamFetchFailed {
        /// Upstream status, passed through to the client
        status: u16,
        /// Upstream error text
        body: String,
    },

    /// Upstream could not be reached or answered with something unusable.
    /// Answered as a 500, like any other failure inside the relay.
    #[error("Upstream unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    /// Upstream body failed before any byte was sent to the client.
    #[error("Stream interrupted: {reason}")]
    StreamInterrupted { reason: String },
}

impl RelayError {
    /// HTTP status the client receives for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingIdentifier | RelayError::InvalidIdentifier { .. } => {
                StatusCode::BAD_REQUEST
            }
            RelayError::MisconfiguredCredential
            | RelayError::UpstreamUnavailable { .. }
            | RelayError::StreamInterrupted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UpstreamNotFound { status, .. }
            | RelayError::UpstreamFetchFailed { status, .. } => passthrough_status(*status),
        }
    }

    /// Checks if the caller can fix this by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RelayError::MissingIdentifier | RelayError::InvalidIdentifier { .. }
        )
    }
}

/// Upstream status as an outward status; values that are not valid HTTP
/// error statuses collapse to 502.
fn passthrough_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|code| code.is_client_error() || code.is_server_error())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            RelayError::MissingIdentifier
            | RelayError::InvalidIdentifier { .. }
            | RelayError::MisconfiguredCredential => (status, self.to_string()).into_response(),
            _ => (
                status,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
        }
    }
}
