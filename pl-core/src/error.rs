//! Global error types for the ParcelLive client.
//!
//! All error categories across the client are unified into a single
//! `PlError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using PlError.
pub type PlResult<T> = Result<T, PlError>;

/// Unified error type covering all error categories in ParcelLive.
#[derive(Error, Debug)]
pub enum PlError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Connection errors --
    /// The transport failed to open or dropped mid-handshake.
    #[error("transport error: {0}")]
    Transport(String),

    /// The connection handshake did not complete within the timeout.
    #[error("handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    /// The connection closed abnormally (no close frame, reset, etc).
    #[error("connection closed abnormally: {0}")]
    AbnormalClose(String),

    /// The session gave up after exhausting its reconnection attempts.
    #[error("gave up after {attempts} reconnection attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// The failure that ended the final attempt.
        last_error: String,
    },

    /// The session is not connected and the operation requires it.
    #[error("not connected")]
    NotConnected,

    // -- Protocol errors --
    /// An inbound frame was not valid JSON or violated the envelope shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// HTTP error from the long-poll transport.
    #[error("http error: {0}")]
    Http(String),

    /// Long-poll request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

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

impl From<serde_json::Error> for PlError {
    fn from(e: serde_json::Error) -> Self {
        PlError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for PlError {
    fn from(e: toml::de::Error) -> Self {
        PlError::Config(e.to_string())
    }
}
