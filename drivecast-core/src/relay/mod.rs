//! Range-preserving streaming relay.
//!
//! Turns one inbound media request into at most two sequential upstream calls
//! (metadata, then media) and relays the media body back without buffering
//! it. Status, `Content-Type`, `Content-Length`, `Content-Range` and
//! `Accept-Ranges` are translated so a browser video element can seek through
//! the relay as if the file were served locally.
//!
//! The relay is stateless: the only shared data is read-only configuration
//! and the provider handle.

pub mod body;
pub mod error;

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info, warn};

pub use self::body::RelayBody;
pub use self::error::RelayError;
use crate::config::ProviderConfig;
use crate::identifier::FileId;
use crate::provider::{DriveProvider, FileMetadata, MediaResponse, ProviderError};

/// Content type used when neither metadata nor the media response name one.
pub const FALLBACK_CONTENT_TYPE: &str = "video/mp4";

/// One inbound media request, reduced to what the relay needs.
#[derive(Debug, Clone, Default)]
pub struct RelayRequest {
    /// Raw `id` query value: a bare id or a share link
    pub id: Option<String>,
    /// Inbound `Range` header, verbatim
    pub range: Option<String>,
    /// HEAD request: compute headers, send no body
    pub head_only: bool,
}

impl RelayRequest {
    pub fn get(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, range: &str) -> Self {
        self.range = Some(range.to_string());
        self
    }

    pub fn head(mut self) -> Self {
        self.head_only = true;
        self
    }
}

/// Outward result of a successful relay: status, headers, lazy body.
pub struct RelayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: RelayBody,
}

impl IntoResponse for RelayResponse {
    fn into_response(self) -> Response {
        let body = if self.body.is_empty() {
            Body::empty()
        } else {
            Body::from_stream(self.body)
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Stateless relay between clients and the upstream drive provider.
///
/// Cheap to clone; every clone shares the same provider and configuration.
#[derive(Clone)]
pub struct StreamRelay {
    config: Arc<ProviderConfig>,
    provider: Arc<dyn DriveProvider>,
}

impl StreamRelay {
    pub fn new(config: ProviderConfig, provider: Arc<dyn DriveProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
        }
    }

    /// Returns true if a provider credential is configured.
    pub fn credential_configured(&self) -> bool {
        self.config.credential().is_some()
    }

    pub fn provider_type(&self) -> &'static str {
        self.provider.provider_type()
    }

    /// Handles one media request end to end.
    ///
    /// Validation happens before any upstream call. Metadata lookup (when
    /// enabled) strictly precedes the media fetch, which strictly precedes
    /// header emission. No step is retried.
    ///
    /// # Errors
    ///
    /// - `RelayError::MissingIdentifier` / `InvalidIdentifier` - Bad `id` parameter
    /// - `RelayError::MisconfiguredCredential` - No API key configured
    /// - `RelayError::UpstreamNotFound` - Metadata lookup answered non-2xx
    /// - `RelayError::UpstreamFetchFailed` - Media fetch answered non-2xx
    /// - `RelayError::UpstreamUnavailable` - Upstream unreachable or metadata unparseable
    /// - `RelayError::StreamInterrupted` - First body read failed
    pub async fn handle(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        let result = self.relay(&request).await;

        if let Err(e) = &result {
            if e.is_client_error() {
                warn!(id = ?request.id, "Rejected stream request: {}", e);
            } else {
                error!(
                    id = ?request.id,
                    range = ?request.range,
                    status = e.status_code().as_u16(),
                    "Stream request failed: {}",
                    e
                );
            }
        }

        result
    }

    async fn relay(&self, request: &RelayRequest) -> Result<RelayResponse, RelayError> {
        let raw_id = request.id.as_deref().unwrap_or_default();
        let file_id = FileId::parse(raw_id)?;
        let api_key = self
            .config
            .credential()
            .ok_or(RelayError::MisconfiguredCredential)?;
        let range = request.range.as_deref();

        info!(
            file_id = %file_id,
            range = range.unwrap_or("none"),
            head = request.head_only,
            "Stream request"
        );

        let metadata = if self.config.metadata_lookup {
            Some(self.resolve_metadata(&file_id, api_key).await?)
        } else {
            None
        };

        let media = self
            .provider
            .fetch_media(file_id.as_str(), api_key, range)
            .await
            .map_err(|e| match e {
                ProviderError::Status { status, body } => {
                    RelayError::UpstreamFetchFailed { status, body }
                }
                other => upstream_unavailable("media fetch", other),
            })?;

        debug!(file_id = %file_id, "Upstream media response: {:?}", media);

        let partial = range.is_some() && media.status == StatusCode::PARTIAL_CONTENT.as_u16();
        let status = select_status(media.status, partial)?;
        let headers = translate_headers(metadata.as_ref(), &media, partial);

        if request.head_only {
            // Dropping the upstream body releases its connection
            return Ok(RelayResponse {
                status,
                headers,
                body: RelayBody::empty(file_id.as_str()),
            });
        }

        let body = RelayBody::start(file_id.as_str(), media.body).await?;

        info!(
            file_id = %file_id,
            status = status.as_u16(),
            content_length = ?headers.get(CONTENT_LENGTH),
            content_range = ?headers.get(CONTENT_RANGE),
            "Relaying upstream body"
        );

        Ok(RelayResponse {
            status,
            headers,
            body,
        })
    }

    async fn resolve_metadata(
        &self,
        file_id: &FileId,
        api_key: &str,
    ) -> Result<FileMetadata, RelayError> {
        let metadata = self
            .provider
            .fetch_metadata(file_id.as_str(), api_key)
            .await
            .map_err(|e| match e {
                ProviderError::Status { status, body } => {
                    RelayError::UpstreamNotFound { status, body }
                }
                other => upstream_unavailable("metadata lookup", other),
            })?;

        debug!(
            file_id = %file_id,
            name = ?metadata.name,
            mime_type = ?metadata.mime_type,
            size = ?metadata.size,
            "Resolved file metadata"
        );

        Ok(metadata)
    }
}

fn upstream_unavailable(step: &str, error: ProviderError) -> RelayError {
    RelayError::UpstreamUnavailable {
        reason: format!("{step}: {error}"),
    }
}

/// 206 only for a range request answered with 206; a 206 nobody asked for
/// becomes 200. Other 2xx statuses pass through.
fn select_status(upstream: u16, partial: bool) -> Result<StatusCode, RelayError> {
    if partial {
        return Ok(StatusCode::PARTIAL_CONTENT);
    }
    if upstream == StatusCode::PARTIAL_CONTENT.as_u16() {
        return Ok(StatusCode::OK);
    }
    StatusCode::from_u16(upstream).map_err(|_| RelayError::UpstreamUnavailable {
        reason: format!("media fetch: invalid status {upstream}"),
    })
}

/// Builds the outward header set from metadata and the media response.
fn translate_headers(
    metadata: Option<&FileMetadata>,
    media: &MediaResponse,
    partial: bool,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let content_type = metadata
        .and_then(|m| m.mime_type.as_deref())
        .filter(|mime| !mime.trim().is_empty())
        .or(media.content_type.as_deref())
        .unwrap_or(FALLBACK_CONTENT_TYPE);
    if !insert_header(&mut headers, CONTENT_TYPE, content_type) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    }

    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if let Some(length) = &media.content_length {
        insert_header(&mut headers, CONTENT_LENGTH, length);
    }

    if partial {
        if let Some(range) = &media.content_range {
            insert_header(&mut headers, CONTENT_RANGE, range);
        }
    }

    headers
}

/// Inserts an upstream-supplied value, skipping values that are not valid
/// header text. Returns whether the header was set.
fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> bool {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
            true
        }
        Err(_) => {
            warn!("Dropping invalid upstream {} value: {:?}", name, value);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use futures::StreamExt;

    use super::*;
    use crate::provider::{SimulatedContent, SimulatedDrive, SimulatedFile};

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    fn relay_with(drive: Arc<SimulatedDrive>, config: ProviderConfig) -> StreamRelay {
        StreamRelay::new(config, drive)
    }

    fn keyed_config() -> ProviderConfig {
        ProviderConfig {
            api_key: Some("test-key".to_string()),
            ..ProviderConfig::default()
        }
    }

    fn media(status: u16, content_type: Option<&str>) -> MediaResponse {
        MediaResponse {
            status,
            content_type: content_type.map(str::to_string),
            content_length: Some("100".to_string()),
            content_range: Some("bytes 0-99/1000".to_string()),
            body: futures::stream::empty().boxed(),
        }
    }

    #[tokio::test]
    async fn test_missing_id_is_rejected_without_upstream_call() {
        let drive = Arc::new(SimulatedDrive::new());
        let relay = relay_with(drive.clone(), keyed_config());

        let error = relay.handle(RelayRequest::default()).await.err().unwrap();
        assert!(matches!(error, RelayError::MissingIdentifier));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let error = relay.handle(RelayRequest::get("  ")).await.err().unwrap();
        assert!(matches!(error, RelayError::MissingIdentifier));

        assert_eq!(drive.metadata_requests(), 0);
        assert_eq!(drive.media_requests(), 0);
    }

    #[tokio::test]
    async fn test_missing_credential_is_rejected_without_upstream_call() {
        let drive = Arc::new(SimulatedDrive::new().with_bytes("clip", None, vec![1u8; 10]));
        let relay = relay_with(drive.clone(), ProviderConfig::default());
        assert!(!relay.credential_configured());

        let error = relay.handle(RelayRequest::get("clip")).await.err().unwrap();
        assert!(matches!(error, RelayError::MisconfiguredCredential));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(drive.metadata_requests(), 0);
        assert_eq!(drive.media_requests(), 0);
    }

    #[tokio::test]
    async fn test_identifier_is_checked_before_credential() {
        let relay = relay_with(Arc::new(SimulatedDrive::new()), ProviderConfig::default());
        let error = relay.handle(RelayRequest::default()).await.err().unwrap();
        assert!(matches!(error, RelayError::MissingIdentifier));
    }

    #[tokio::test]
    async fn test_range_request_is_passed_through() {
        let data = sample_data(1000);
        let drive = Arc::new(
            SimulatedDrive::new()
                .with_bytes("clip", Some("video/webm"), data.clone())
                .with_chunk_size(16),
        );
        let relay = relay_with(drive.clone(), keyed_config());

        let response = relay
            .handle(RelayRequest::get("clip").with_range("bytes=0-99"))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers[CONTENT_RANGE], "bytes 0-99/1000");
        assert_eq!(response.headers[CONTENT_LENGTH], "100");
        assert_eq!(response.headers[ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers[CONTENT_TYPE], "video/webm");
        assert_eq!(drive.ranges_seen(), vec![Some("bytes=0-99".to_string())]);

        let body = to_bytes(response.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], &data[..100]);
    }

    #[tokio::test]
    async fn test_full_content_has_no_content_range() {
        let data = sample_data(300);
        let drive = Arc::new(SimulatedDrive::new().with_bytes("clip", Some("video/mp4"), data.clone()));
        let relay = relay_with(drive.clone(), keyed_config());

        let response = relay.handle(RelayRequest::get("clip")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers[CONTENT_LENGTH], "300");
        assert!(response.headers.get(CONTENT_RANGE).is_none());
        assert_eq!(drive.ranges_seen(), vec![None]);

        let body = to_bytes(response.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], &data[..]);
    }

    #[tokio::test]
    async fn test_share_link_is_accepted_as_id() {
        let drive = Arc::new(SimulatedDrive::new().with_bytes("ABC123", None, vec![7u8; 8]));
        let relay = relay_with(drive, keyed_config());

        let response = relay
            .handle(RelayRequest::get("https://drive.example.com/file/d/ABC123/view"))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metadata_not_found_skips_media_fetch() {
        let drive = Arc::new(SimulatedDrive::new());
        let relay = relay_with(drive.clone(), keyed_config());

        let error = relay.handle(RelayRequest::get("nope")).await.err().unwrap();

        match &error {
            RelayError::UpstreamNotFound { status, body } => {
                assert_eq!(*status, 404);
                assert!(body.contains("File not found: nope."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(drive.metadata_requests(), 1);
        assert_eq!(drive.media_requests(), 0);
    }

    #[tokio::test]
    async fn test_media_failure_passes_status_through() {
        let drive = Arc::new(SimulatedDrive::new().with_bytes("clip", None, vec![0u8; 10]));
        let relay = relay_with(drive, keyed_config());

        let error = relay
            .handle(RelayRequest::get("clip").with_range("bytes=50-"))
            .await
            .err()
            .unwrap();

        assert!(matches!(error, RelayError::UpstreamFetchFailed { status: 416, .. }));
        assert_eq!(error.status_code(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    /// Provider whose every call fails without an upstream status.
    struct FailingProvider {
        metadata_error: ProviderError,
        media_error: ProviderError,
    }

    #[async_trait::async_trait]
    impl DriveProvider for FailingProvider {
        async fn fetch_metadata(&self, _: &str, _: &str) -> Result<FileMetadata, ProviderError> {
            Err(self.metadata_error.clone())
        }

        async fn fetch_media(
            &self,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> Result<MediaResponse, ProviderError> {
            Err(self.media_error.clone())
        }

        fn provider_type(&self) -> &'static str {
            "failing"
        }
    }

    fn failing_relay(config: ProviderConfig) -> StreamRelay {
        let refused = ProviderError::Transport {
            reason: "failed to connect to upstream".to_string(),
        };
        StreamRelay::new(
            config,
            Arc::new(FailingProvider {
                metadata_error: refused.clone(),
                media_error: refused,
            }),
        )
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_500_with_json_error() {
        let relay = failing_relay(keyed_config());

        let error = relay.handle(RelayRequest::get("clip")).await.err().unwrap();
        assert!(matches!(error, RelayError::UpstreamUnavailable { .. }));

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .contains("failed to connect to upstream")
        );
    }

    #[tokio::test]
    async fn test_media_transport_failure_is_500() {
        let config = ProviderConfig {
            metadata_lookup: false,
            ..keyed_config()
        };
        let relay = failing_relay(config);

        let error = relay
            .handle(RelayRequest::get("clip").with_range("bytes=0-"))
            .await
            .err()
            .unwrap();
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unparseable_metadata_is_500() {
        let relay = StreamRelay::new(
            keyed_config(),
            Arc::new(FailingProvider {
                metadata_error: ProviderError::InvalidMetadata {
                    reason: "expected value at line 1 column 1".to_string(),
                },
                media_error: ProviderError::Transport {
                    reason: "unused".to_string(),
                },
            }),
        );

        let error = relay.handle(RelayRequest::get("clip")).await.err().unwrap();
        assert!(matches!(error, RelayError::UpstreamUnavailable { .. }));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_metadata_lookup_can_be_skipped() {
        let mut file = SimulatedFile::new(
            "clip",
            Some("video/quicktime"),
            SimulatedContent::Bytes(vec![1u8; 10].into()),
        );
        file.metadata_status = Some(500);
        let drive = Arc::new(SimulatedDrive::new().with_file("clip", file));

        let config = ProviderConfig {
            metadata_lookup: false,
            ..keyed_config()
        };
        let relay = relay_with(drive.clone(), config);

        let response = relay.handle(RelayRequest::get("clip")).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[CONTENT_TYPE], "video/quicktime");
        assert_eq!(drive.metadata_requests(), 0);
    }

    #[tokio::test]
    async fn test_head_request_has_headers_and_no_body() {
        let drive = Arc::new(SimulatedDrive::new().with_bytes("clip", Some("video/mp4"), vec![1u8; 64]));
        let relay = relay_with(drive, keyed_config());

        let response = relay
            .handle(RelayRequest::get("clip").head())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[CONTENT_LENGTH], "64");
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_status_and_ends_body() {
        let mut file = SimulatedFile::new(
            "clip",
            Some("video/mp4"),
            SimulatedContent::Pattern { len: 1000 },
        );
        file.fail_after_chunks = Some(2);
        let drive = Arc::new(SimulatedDrive::new().with_file("clip", file).with_chunk_size(100));
        let relay = relay_with(drive, keyed_config());

        let response = relay.handle(RelayRequest::get("clip")).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let mut body = response.body;
        assert!(body.next().await.unwrap().is_ok());
        assert!(body.next().await.unwrap().is_ok());
        assert!(body.next().await.unwrap().is_err());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_before_first_chunk_is_500() {
        let mut file = SimulatedFile::new("clip", None, SimulatedContent::Pattern { len: 1000 });
        file.fail_after_chunks = Some(0);
        let drive = Arc::new(SimulatedDrive::new().with_file("clip", file));
        let relay = relay_with(drive, keyed_config());

        let error = relay.handle(RelayRequest::get("clip")).await.err().unwrap();
        assert!(matches!(error, RelayError::StreamInterrupted { .. }));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_status_selection() {
        assert_eq!(select_status(206, true).unwrap(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(select_status(206, false).unwrap(), StatusCode::OK);
        assert_eq!(select_status(200, false).unwrap(), StatusCode::OK);
        assert_eq!(select_status(203, false).unwrap(), StatusCode::NON_AUTHORITATIVE_INFORMATION);
    }

    #[test]
    fn test_content_type_precedence() {
        let metadata = FileMetadata {
            mime_type: Some("video/x-matroska".to_string()),
            ..FileMetadata::default()
        };

        let headers = translate_headers(Some(&metadata), &media(200, Some("application/octet-stream")), false);
        assert_eq!(headers[CONTENT_TYPE], "video/x-matroska");

        let headers = translate_headers(None, &media(200, Some("video/webm")), false);
        assert_eq!(headers[CONTENT_TYPE], "video/webm");

        let headers = translate_headers(Some(&FileMetadata::default()), &media(200, None), false);
        assert_eq!(headers[CONTENT_TYPE], FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn test_content_range_only_for_partial_responses() {
        let headers = translate_headers(None, &media(206, None), true);
        assert_eq!(headers[CONTENT_RANGE], "bytes 0-99/1000");

        let headers = translate_headers(None, &media(206, None), false);
        assert!(headers.get(CONTENT_RANGE).is_none());
        assert_eq!(headers[ACCEPT_RANGES], "bytes");
        assert_eq!(headers[CONTENT_LENGTH], "100");
    }

    #[test]
    fn test_invalid_upstream_header_values_are_dropped() {
        let mut response = media(200, Some("video/mp4\n"));
        response.content_length = Some("12\r\n34".to_string());

        let headers = translate_headers(None, &response, false);
        assert_eq!(headers[CONTENT_TYPE], FALLBACK_CONTENT_TYPE);
        assert!(headers.get(CONTENT_LENGTH).is_none());
    }
}
