//! Production drive provider backed by reqwest.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, RANGE};
use tracing::debug;
use url::Url;

use super::{DriveProvider, FileMetadata, MediaResponse, ProviderError};
use crate::config::{NetworkConfig, ProviderConfig};

/// Fields requested from the metadata endpoint.
const METADATA_FIELDS: &str = "id,name,mimeType,size";

/// Largest metadata document accepted from upstream.
pub const MAX_METADATA_BYTES: usize = 1024 * 1024;

/// Upstream error bodies are truncated to this many bytes.
pub const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Drive provider speaking the upstream files API over HTTPS.
///
/// One client (and connection pool) is shared by every request.
#[derive(Debug, Clone)]
pub struct HttpDriveProvider {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpDriveProvider {
    /// Creates a provider for `provider.base_url` with the given network settings.
    ///
    /// # Errors
    ///
    /// - `ProviderError::InvalidConfiguration` - If the base URL cannot hold a path or the client cannot be built
    pub fn new(provider: &ProviderConfig, network: &NetworkConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&provider.base_url).map_err(|e| {
            ProviderError::InvalidConfiguration {
                reason: format!("invalid provider base '{}': {e}", provider.base_url),
            }
        })?;

        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidConfiguration {
                reason: format!("provider base '{}' cannot hold a path", provider.base_url),
            });
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(network.connect_timeout)
            .user_agent(network.user_agent)
            .redirect(reqwest::redirect::Policy::limited(network.max_redirects));

        if let Some(read_timeout) = network.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ProviderError::InvalidConfiguration {
                reason: format!("HTTP client creation failed: {e}"),
            })?;

        Ok(Self { client, base_url })
    }

    /// Builds `{base}/files/{id}` with the given query pairs and the key last.
    fn file_url(&self, file_id: &str, api_key: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("files").push(file_id);
        }
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params {
                query.append_pair(name, value);
            }
            query.append_pair("key", api_key);
        }
        url
    }
}

#[async_trait]
impl DriveProvider for HttpDriveProvider {
    async fn fetch_metadata(
        &self,
        file_id: &str,
        api_key: &str,
    ) -> Result<FileMetadata, ProviderError> {
        let url = self.file_url(file_id, api_key, &[("fields", METADATA_FIELDS)]);
        debug!("Fetching metadata from {}", url.path());

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let (body, truncated) = read_capped(response, MAX_METADATA_BYTES)
            .await
            .map_err(transport_error)?;
        if truncated {
            return Err(ProviderError::InvalidMetadata {
                reason: format!("metadata response exceeds {MAX_METADATA_BYTES} bytes"),
            });
        }
        serde_json::from_slice(&body).map_err(|e| ProviderError::InvalidMetadata {
            reason: e.to_string(),
        })
    }

    async fn fetch_media(
        &self,
        file_id: &str,
        api_key: &str,
        range: Option<&str>,
    ) -> Result<MediaResponse, ProviderError> {
        let url = self.file_url(file_id, api_key, &[("alt", "media")]);
        debug!("Fetching media from {} (range: {:?})", url.path(), range);

        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        let headers = response.headers();
        let content_type = header_string(headers, CONTENT_TYPE);
        let content_length = header_string(headers, CONTENT_LENGTH);
        let content_range = header_string(headers, CONTENT_RANGE);

        Ok(MediaResponse {
            status: status.as_u16(),
            content_type,
            content_length,
            content_range,
            body: response.bytes_stream().map_err(transport_error).boxed(),
        })
    }

    fn provider_type(&self) -> &'static str {
        "http"
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Reads the error body of a non-success response, truncated to
/// [`MAX_ERROR_BODY_BYTES`].
async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = match read_capped(response, MAX_ERROR_BODY_BYTES).await {
        Ok((bytes, _)) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("<unreadable error body: {}>", e.without_url()),
    };
    ProviderError::Status { status, body }
}

/// Reads at most `limit` bytes of a body. The flag is true if the body was
/// longer; the rest is never read.
async fn read_capped(
    response: reqwest::Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = limit - buffer.len();
        if chunk.len() > room {
            buffer.extend_from_slice(&chunk[..room]);
            return Ok((buffer, true));
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok((buffer, false))
}

/// Classifies a reqwest failure. The URL is stripped since it carries the key.
fn transport_error(error: reqwest::Error) -> ProviderError {
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "failed to connect to upstream".to_string()
    } else if error.is_body() || error.is_decode() {
        format!("failed to read response body: {}", error.without_url())
    } else {
        format!("HTTP request failed: {}", error.without_url())
    };

    ProviderError::Transport { reason }
}
