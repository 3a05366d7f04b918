//! Global error types for the Vidarr client.
//!
//! All error categories across the client are unified into a single
//! `VdError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using VdError.
pub type VdResult<T> = Result<T, VdError>;

/// Unified error type covering all error categories in Vidarr.
#[derive(Error, Debug)]
pub enum VdError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Stream errors --
    /// WebSocket connection error.
    #[error("socket error: {0}")]
    Socket(String),

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    Frame(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Notification errors --
    /// Desktop notification failed.
    #[error("notification error: {0}")]
    Notification(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for VdError {
    fn from(e: serde_json::Error) -> Self {
        VdError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for VdError {
    fn from(e: toml::de::Error) -> Self {
        VdError::Config(e.to_string())
    }
}
