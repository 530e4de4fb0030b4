//! HTTP request handlers organized by functionality

pub mod health;
pub mod range;
pub mod stream;

// Re-export handler functions
pub use health::{HealthStatus, health};
pub use range::extract_range_header;
pub use stream::{StreamQuery, stream_file};
