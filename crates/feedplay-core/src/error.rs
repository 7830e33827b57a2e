//! Error types for Feedplay Core

use thiserror::Error;

/// Result type alias for feed media operations
pub type Result<T> = std::result::Result<T, Error>;

/// Feed media error types
#[derive(Error, Debug)]
pub enum Error {
    // Manifest errors
    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("Could not resolve a playable resource for {location}")]
    Resolution { location: String },

    #[error("Existence probe timed out: {url}")]
    ProbeTimeout { url: String },

    // Playback errors
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Playback unavailable for {content_id} after {attempts} attempts")]
    PlaybackUnavailable { content_id: String, attempts: u32 },

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid location: {0}")]
    InvalidLocation(#[from] url::ParseError),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a playback failure
    pub fn playback(msg: impl Into<String>) -> Self {
        Error::PlaybackFailed(msg.into())
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ManifestFetch(_)
                | Error::ProbeTimeout { .. }
                | Error::PlaybackFailed(_)
                | Error::Network(_)
        )
    }

    /// Returns the error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::ManifestParse(_) => "MANIFEST_PARSE",
            Error::Resolution { .. } => "RESOLUTION",
            Error::ProbeTimeout { .. } => "PROBE_TIMEOUT",
            Error::PlaybackFailed(_) => "PLAYBACK_FAILED",
            Error::PlaybackUnavailable { .. } => "PLAYBACK_UNAVAILABLE",
            Error::PlayerNotFound(_) => "PLAYER_NOT_FOUND",
            Error::Network(_) => "NETWORK",
            Error::InvalidLocation(_) => "INVALID_LOCATION",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ConfigParse(_) => "CONFIG_PARSE",
            Error::Io(_) => "IO",
        }
    }
}
