//! Error types for the mail API client.

use std::io;

use maildock_core::FetchError;

/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// API client error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server returned status {0}")]
    Status(u16),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error on an event source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<Error> for FetchError {
    fn from(err: Error) -> Self {
        match err {
            Error::Status(status) => Self::Status(status),
            Error::Http(err) if err.is_decode() => Self::Decode(err.to_string()),
            Error::Http(err) => match err.status() {
                Some(status) => Self::Status(status.as_u16()),
                None => Self::Network(err.to_string()),
            },
            Error::Json(err) => Self::Decode(err.to_string()),
            other => Self::Network(other.to_string()),
        }
    }
}
