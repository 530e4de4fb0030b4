//! In-memory drive provider for tests and offline development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;

use super::{ByteStream, DriveProvider, FileMetadata, MediaResponse, ProviderError};

/// Default chunk size for simulated bodies.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Id of the file seeded by [`SimulatedDrive::demo`].
pub const DEMO_FILE_ID: &str = "demo";

/// Bytes backing a simulated file.
#[derive(Debug, Clone)]
pub enum SimulatedContent {
    /// Literal file content
    Bytes(Bytes),
    /// `len` bytes of a repeating pattern, generated chunk by chunk
    Pattern { len: u64 },
}

impl SimulatedContent {
    pub fn len(&self) -> u64 {
        match self {
            Self::Bytes(data) => data.len() as u64,
            Self::Pattern { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns bytes `[start, end)`, clamped to the content.
    fn slice(&self, start: u64, end: u64) -> Bytes {
        match self {
            Self::Bytes(data) => {
                let clamp = |offset: u64| {
                    usize::try_from(offset).map_or(data.len(), |offset| offset.min(data.len()))
                };
                let (start, end) = (clamp(start), clamp(end));
                data.slice(start..end.max(start))
            }
            Self::Pattern { .. } => (start..end).map(pattern_byte).collect::<Vec<u8>>().into(),
        }
    }
}

/// Byte at `offset` of a pattern file.
pub fn pattern_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// A file stored in the simulated drive.
#[derive(Debug, Clone)]
pub struct SimulatedFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub content: SimulatedContent,
    /// Status the metadata endpoint answers with instead of 200
    pub metadata_status: Option<u16>,
    /// Body errors after this many chunks have been delivered
    pub fail_after_chunks: Option<usize>,
}

impl SimulatedFile {
    pub fn new(name: &str, mime_type: Option<&str>, content: SimulatedContent) -> Self {
        Self {
            name: name.to_string(),
            mime_type: mime_type.map(str::to_string),
            content,
            metadata_status: None,
            fail_after_chunks: None,
        }
    }
}

/// Simulated drive service.
///
/// Answers the same way the real files API does: JSON error text for unknown
/// files, 206 with `Content-Range` for satisfiable single ranges, 416 for
/// ranges past the end. Counts every call so tests can assert that no
/// upstream request was made.
#[derive(Debug)]
pub struct SimulatedDrive {
    files: HashMap<String, SimulatedFile>,
    chunk_size: usize,
    api_key: Option<String>,
    metadata_requests: AtomicUsize,
    media_requests: AtomicUsize,
    ranges_seen: Mutex<Vec<Option<String>>>,
}

impl Default for SimulatedDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDrive {
    /// Creates an empty drive accepting any API key.
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            api_key: None,
            metadata_requests: AtomicUsize::new(0),
            media_requests: AtomicUsize::new(0),
            ranges_seen: Mutex::new(Vec::new()),
        }
    }

    /// Drive seeded with a 16 MiB pattern file under [`DEMO_FILE_ID`].
    pub fn demo() -> Self {
        Self::new().with_file(
            DEMO_FILE_ID,
            SimulatedFile::new(
                "demo.mp4",
                Some("video/mp4"),
                SimulatedContent::Pattern { len: 16 * 1024 * 1024 },
            ),
        )
    }

    pub fn with_file(mut self, file_id: &str, file: SimulatedFile) -> Self {
        self.files.insert(file_id.to_string(), file);
        self
    }

    /// Adds a file with literal content.
    pub fn with_bytes(self, file_id: &str, mime_type: Option<&str>, data: impl Into<Bytes>) -> Self {
        let file = SimulatedFile::new(file_id, mime_type, SimulatedContent::Bytes(data.into()));
        self.with_file(file_id, file)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Only `api_key` is accepted; anything else answers 400.
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn metadata_requests(&self) -> usize {
        self.metadata_requests.load(Ordering::SeqCst)
    }

    pub fn media_requests(&self) -> usize {
        self.media_requests.load(Ordering::SeqCst)
    }

    /// Range headers received by the media endpoint, in order.
    pub fn ranges_seen(&self) -> Vec<Option<String>> {
        self.ranges_seen.lock().clone()
    }

    fn check_key(&self, api_key: &str) -> Result<(), ProviderError> {
        match &self.api_key {
            Some(expected) if expected != api_key => Err(ProviderError::Status {
                status: 400,
                body: error_body(400, "API key not valid. Please pass a valid API key."),
            }),
            _ => Ok(()),
        }
    }

    fn lookup(&self, file_id: &str) -> Result<&SimulatedFile, ProviderError> {
        self.files.get(file_id).ok_or_else(|| ProviderError::Status {
            status: 404,
            body: error_body(404, &format!("File not found: {file_id}.")),
        })
    }

    fn body_stream(&self, file: &SimulatedFile, start: u64, end: u64) -> ByteStream {
        let chunk_size = self.chunk_size as u64;
        let content = file.content.clone();
        let fail_after = file.fail_after_chunks;

        stream::unfold((start, 0usize), move |(offset, delivered)| {
            let content = content.clone();
            async move {
                if fail_after == Some(delivered) {
                    let error = ProviderError::Transport {
                        reason: "simulated connection reset".to_string(),
                    };
                    // Ends the stream after yielding the error
                    return Some((Err(error), (end, usize::MAX)));
                }
                if offset >= end {
                    return None;
                }
                let chunk_end = (offset + chunk_size).min(end);
                Some((Ok(content.slice(offset, chunk_end)), (chunk_end, delivered + 1)))
            }
        })
        .boxed()
    }
}

#[async_trait]
impl DriveProvider for SimulatedDrive {
    async fn fetch_metadata(
        &self,
        file_id: &str,
        api_key: &str,
    ) -> Result<FileMetadata, ProviderError> {
        self.metadata_requests.fetch_add(1, Ordering::SeqCst);
        self.check_key(api_key)?;
        let file = self.lookup(file_id)?;

        if let Some(status) = file.metadata_status {
            return Err(ProviderError::Status {
                status,
                body: error_body(status, "Simulated metadata failure."),
            });
        }

        Ok(FileMetadata {
            id: file_id.to_string(),
            name: Some(file.name.clone()),
            mime_type: file.mime_type.clone(),
            size: Some(file.content.len().to_string()),
        })
    }

    async fn fetch_media(
        &self,
        file_id: &str,
        api_key: &str,
        range: Option<&str>,
    ) -> Result<MediaResponse, ProviderError> {
        self.media_requests.fetch_add(1, Ordering::SeqCst);
        self.ranges_seen.lock().push(range.map(str::to_string));
        self.check_key(api_key)?;
        let file = self.lookup(file_id)?;
        let total = file.content.len();

        let byte_range = match range.and_then(parse_single_range) {
            Some(spec) => Some(spec.resolve(total).ok_or_else(|| ProviderError::Status {
                status: 416,
                body: error_body(416, "Request range not satisfiable"),
            })?),
            None => None,
        };

        let response = match byte_range {
            Some((start, end)) => MediaResponse {
                status: 206,
                content_type: file.mime_type.clone(),
                content_length: Some((end - start).to_string()),
                content_range: Some(format!("bytes {}-{}/{}", start, end - 1, total)),
                body: self.body_stream(file, start, end),
            },
            None => MediaResponse {
                status: 200,
                content_type: file.mime_type.clone(),
                content_length: Some(total.to_string()),
                content_range: None,
                body: self.body_stream(file, 0, total),
            },
        };

        Ok(response)
    }

    fn provider_type(&self) -> &'static str {
        "simulated"
    }
}

/// Single byte range as requested by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeSpec {
    /// `bytes=start-` or `bytes=start-end`
    From { start: u64, end: Option<u64> },
    /// `bytes=-len`
    Suffix { len: u64 },
}

impl RangeSpec {
    /// Resolves against a file size into a half-open `[start, end)` range.
    fn resolve(self, total: u64) -> Option<(u64, u64)> {
        match self {
            Self::From { start, end } => {
                if start >= total {
                    return None;
                }
                let last = end.map_or(total - 1, |end| end.min(total - 1));
                (last >= start).then_some((start, last + 1))
            }
            Self::Suffix { len } => {
                if len == 0 || total == 0 {
                    return None;
                }
                Some((total.saturating_sub(len), total))
            }
        }
    }
}

/// Parses `bytes=a-b`, `bytes=a-` and `bytes=-n`. Anything else (including
/// multi-range requests) is ignored, which yields a full 200 response.
fn parse_single_range(header: &str) -> Option<RangeSpec> {
    let spec = header.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }

    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        return Some(RangeSpec::Suffix {
            len: end.parse().ok()?,
        });
    }

    let start = start.parse().ok()?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some(RangeSpec::From { start, end })
}

/// Error document in the shape the files API uses.
fn error_body(code: u16, message: &str) -> String {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
        }
    })
    .to_string()
}
