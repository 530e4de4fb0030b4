//! Drivecast Web - HTTP front end for the streaming relay
//!
//! Exposes the relay as a single range-capable media endpoint that a browser
//! video element can address directly, plus a small health endpoint.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]

pub mod handlers;
pub mod server;

// Re-export main types
pub use server::{AppState, build_router, run_server};
