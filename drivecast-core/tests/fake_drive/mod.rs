//! Loopback HTTP server imitating the drive files API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;

pub const GOOD_KEY: &str = "good-key";
pub const FILE_LEN: usize = 1000;

/// Answers metadata with a document far larger than any real one.
pub const BLOATED_ID: &str = "bloated";
/// Answers every request with a 503 and a very large error page.
pub const ERROR_PAGE_ID: &str = "error-page";
pub const ERROR_PAGE_LEN: usize = 4 * 1024 * 1024;

/// Request as seen by the fake drive.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub file_id: String,
    pub query: HashMap<String, String>,
    pub range: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakeDrive {
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl FakeDrive {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

pub fn file_bytes() -> Vec<u8> {
    (0..FILE_LEN).map(|i| (i % 256) as u8).collect()
}

/// Starts the fake drive and returns its `.../drive/v3` base URL.
pub async fn spawn_fake_drive() -> (String, FakeDrive) {
    let drive = FakeDrive::default();
    let app = Router::new()
        .route("/drive/v3/files/{id}", get(serve_file))
        .with_state(drive.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/drive/v3"), drive)
}

async fn serve_file(
    State(drive): State<FakeDrive>,
    Path(file_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    drive.requests.lock().push(RecordedRequest {
        file_id: file_id.clone(),
        query: query.clone(),
        range: range.clone(),
    });

    if query.get("key").map(String::as_str) != Some(GOOD_KEY) {
        return (StatusCode::BAD_REQUEST, r#"{"error":{"message":"API key not valid"}}"#)
            .into_response();
    }

    if file_id == ERROR_PAGE_ID {
        return (StatusCode::SERVICE_UNAVAILABLE, "x".repeat(ERROR_PAGE_LEN)).into_response();
    }

    if file_id == BLOATED_ID {
        let padding = " ".repeat(2 * 1024 * 1024);
        return (
            [(CONTENT_TYPE, "application/json")],
            format!(r#"{{"id":"bloated",{padding}"mimeType":"video/mp4"}}"#),
        )
            .into_response();
    }

    if file_id != "clip" {
        return (
            StatusCode::NOT_FOUND,
            format!(r#"{{"error":{{"message":"File not found: {file_id}."}}}}"#),
        )
            .into_response();
    }

    if query.get("alt").map(String::as_str) != Some("media") {
        return (
            [(CONTENT_TYPE, "application/json")],
            r#"{"id":"clip","name":"clip.mp4","mimeType":"video/mp4","size":"1000"}"#,
        )
            .into_response();
    }

    let data = file_bytes();
    match range.as_deref() {
        Some("bytes=0-99") => Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, "100")
            .header(CONTENT_RANGE, format!("bytes 0-99/{FILE_LEN}"))
            .body(Body::from(data[..100].to_vec()))
            .unwrap(),
        _ => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, FILE_LEN.to_string())
            .body(Body::from(data))
            .unwrap(),
    }
}
