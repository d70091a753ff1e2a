//! Error types for jsbox
//!
//! These are host-side failures. Faults raised by sandboxed code never
//! surface here; they are classified into [`crate::sandbox::ErrorRecord`]
//! at the isolation boundary.

use thiserror::Error;

/// Result type alias using jsbox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for jsbox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sandbox setup or driver error
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Chart rendering error raised by a host renderer
    #[error("Chart error: {0}")]
    Chart(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::Config(_))
    }
}

impl From<humantime::DurationError> for Error {
    fn from(err: humantime::DurationError) -> Self {
        Error::Config(err.to_string())
    }
}
