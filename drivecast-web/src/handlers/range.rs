//! HTTP Range header capture for relayed streaming
//!
//! The relay never interprets byte ranges itself. The upstream provider
//! decides what is satisfiable; the header is forwarded exactly as received.

use axum::http::HeaderMap;
use axum::http::header::RANGE;

/// Extracts the Range header verbatim.
///
/// Returns None if no range header is present, if it is blank, or if it is
/// not valid visible ASCII.
pub fn extract_range_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(RANGE)
        .and_then(|range| range.to_str().ok())
        .filter(|range| !range.trim().is_empty())
        .map(|s| s.to_string())
}
