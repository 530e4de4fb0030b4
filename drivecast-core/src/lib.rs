//! Drivecast Core - range-preserving media relay for cloud drive files
//!
//! This crate provides the building blocks of the relay: configuration,
//! share-link identifier extraction, the upstream drive provider seam, and
//! the stateless streaming relay that translates upstream responses into
//! seekable progressive streams.

pub mod config;
pub mod identifier;
pub mod mode;
pub mod provider;
pub mod relay;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::DrivecastConfig;
pub use identifier::{FileId, extract_file_id};
pub use mode::RuntimeMode;
pub use provider::{DriveProvider, HttpDriveProvider, ProviderError, SimulatedDrive};
pub use relay::{RelayError, RelayRequest, RelayResponse, StreamRelay};

/// Errors that can bubble up from process-level drivecast operations.
///
/// Per-request failures are [`RelayError`]s and are answered over HTTP;
/// these are the failures that stop the process from serving at all.
#[derive(Debug, thiserror::Error)]
pub enum DrivecastError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DrivecastError>;

/// Builds the relay for the given mode.
///
/// Production talks to `config.provider.base_url`; development serves the
/// seeded simulated drive and accepts any key.
///
/// # Errors
///
/// - `DrivecastError::Provider` - If the HTTP provider cannot be constructed
pub fn build_relay(config: &DrivecastConfig, mode: RuntimeMode) -> Result<StreamRelay> {
    match mode {
        RuntimeMode::Production => {
            let provider = HttpDriveProvider::new(&config.provider, &config.network)?;
            Ok(StreamRelay::new(
                config.provider.clone(),
                std::sync::Arc::new(provider),
            ))
        }
        RuntimeMode::Development => {
            let mut provider_config = config.provider.clone();
            if provider_config.credential().is_none() {
                provider_config.api_key = Some("development".to_string());
            }
            Ok(StreamRelay::new(
                provider_config,
                std::sync::Arc::new(SimulatedDrive::demo()),
            ))
        }
    }
}
