//! Centralized configuration for drivecast.
//!
//! All tunable parameters are defined here and injected into the relay at
//! startup. Nothing in the request path reads the environment directly.

use std::time::Duration;

/// Environment variable holding the upstream provider API key.
pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";

/// Default upstream API base.
pub const DEFAULT_PROVIDER_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Central configuration for all drivecast components.
///
/// Groups related settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct DrivecastConfig {
    pub provider: ProviderConfig,
    pub network: NetworkConfig,
    pub server: ServerConfig,
}

/// Upstream drive provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key appended to every upstream call. `None` fails requests with 500.
    pub api_key: Option<String>,
    /// Base URL of the provider's files API
    pub base_url: String,
    /// Whether to look up file metadata before fetching media
    pub metadata_lookup: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_PROVIDER_BASE.to_string(),
            metadata_lookup: true,
        }
    }
}

impl ProviderConfig {
    /// Returns the API key if one is configured and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

/// Outbound HTTP client configuration.
///
/// No total request timeout is applied to upstream calls. Stalled bodies
/// are bounded by `read_timeout`.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// TCP/TLS connect timeout for upstream calls
    pub connect_timeout: Duration,
    /// Maximum idle time between reads of an upstream response (None = unbounded)
    pub read_timeout: Option<Duration>,
    /// User agent for upstream requests
    pub user_agent: &'static str,
    /// Maximum redirects followed on the media endpoint
    pub max_redirects: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_secs(30)),
            user_agent: "drivecast/0.1.0",
            max_redirects: 5,
        }
    }
}

/// Inbound HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Socket address string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DrivecastConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads `.env.local` and then `.env` into the process environment.
    ///
    /// Variables already set in the environment win. Missing files are ignored.
    pub fn load_dotenv() {
        for file in [".env.local", ".env"] {
            match dotenvy::from_filename(file) {
                Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
                Err(e) if e.not_found() => {}
                Err(e) => tracing::warn!("Ignoring unreadable {}: {}", file, e),
            }
        }
    }

    /// Builds configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // Provider configuration overrides
        if let Some(key) = lookup(API_KEY_VAR) {
            config.provider.api_key = Some(key);
        }

        if let Some(base) = lookup("DRIVECAST_PROVIDER_BASE") {
            let base = base.trim().trim_end_matches('/');
            if !base.is_empty() {
                config.provider.base_url = base.to_string();
            }
        }

        if let Some(enabled) = lookup("DRIVECAST_METADATA_LOOKUP") {
            config.provider.metadata_lookup = parse_flag(&enabled).unwrap_or(true);
        }

        // Network configuration overrides
        if let Some(seconds) = lookup("DRIVECAST_CONNECT_TIMEOUT").and_then(|v| v.parse().ok()) {
            config.network.connect_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = lookup("DRIVECAST_READ_TIMEOUT").and_then(|v| v.parse::<u64>().ok())
        {
            config.network.read_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
        }

        // Server configuration overrides
        if let Some(host) = lookup("DRIVECAST_HOST") {
            config.server.host = host;
        }

        if let Some(port) = lookup("DRIVECAST_PORT").and_then(|v| v.parse().ok()) {
            config.server.port = port;
        }

        config
    }

    /// Creates a configuration for tests: a dummy key and no read timeout.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.provider.api_key = Some("test-key".to_string());
        config.network.read_timeout = None;
        config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
