//! Upstream drive provider abstraction.
//!
//! The relay only ever talks to the upstream service through [`DriveProvider`],
//! so the same request path runs against the real files API in production and
//! against an in-memory drive in tests and development mode.

pub mod http;
pub mod simulation;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::http::HttpDriveProvider;
pub use self::simulation::{SimulatedContent, SimulatedDrive, SimulatedFile};

/// Lazy, non-restartable sequence of upstream body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

/// File metadata as returned by the provider's metadata endpoint.
///
/// Only `id`, `name`, `mimeType` and `size` are requested. The provider
/// encodes `size` as a decimal string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

/// Successful response from the media endpoint, body not yet consumed.
pub struct MediaResponse {
    /// Upstream status code, always 2xx
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub content_range: Option<String>,
    pub body: ByteStream,
}

impl std::fmt::Debug for MediaResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("content_range", &self.content_range)
            .finish_non_exhaustive()
    }
}

/// Errors surfaced by a drive provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Upstream answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Status {
        /// Upstream HTTP status code
        status: u16,
        /// Upstream error text, verbatim
        body: String,
    },

    /// Request could not be sent or the response could not be read.
    #[error("upstream transport failure: {reason}")]
    Transport { reason: String },

    /// Metadata response was not the expected JSON document.
    #[error("invalid metadata response: {reason}")]
    InvalidMetadata { reason: String },

    /// Provider could not be constructed from the given configuration.
    #[error("invalid provider configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

/// Access to files stored with the upstream drive service.
#[async_trait]
pub trait DriveProvider: Send + Sync {
    /// Looks up `{id, name, mimeType, size}` for a file.
    ///
    /// # Errors
    ///
    /// - `ProviderError::Status` - Upstream answered non-2xx
    /// - `ProviderError::Transport` - Network failure
    /// - `ProviderError::InvalidMetadata` - Response body is not valid metadata JSON
    async fn fetch_metadata(
        &self,
        file_id: &str,
        api_key: &str,
    ) -> Result<FileMetadata, ProviderError>;

    /// Starts a raw content download, forwarding `range` verbatim when present.
    ///
    /// Returns once status and headers are known; the body is read lazily.
    ///
    /// # Errors
    ///
    /// - `ProviderError::Status` - Upstream answered non-2xx
    /// - `ProviderError::Transport` - Network failure before headers arrived
    async fn fetch_media(
        &self,
        file_id: &str,
        api_key: &str,
        range: Option<&str>,
    ) -> Result<MediaResponse, ProviderError>;

    /// Short name used in logs.
    fn provider_type(&self) -> &'static str;
}
