//! Error types for the core library.
//!
//! Nothing in this crate is fatal to the process: every error here ends up
//! either as an inline "error loading" state, a transient user message, or a
//! log line.

use thiserror::Error;

use crate::model::MessageId;

/// A list or detail fetch that did not produce data.
///
/// Recovered by the next invalidation; the cache keeps the last good data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("Server returned status {0}")]
    Status(u16),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A user mutation the server did not confirm.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    /// The server refused the deletion.
    #[error("Failed to delete message {id}: server returned status {status}")]
    Rejected {
        /// Message the deletion targeted.
        id: MessageId,
        /// Status code returned by the server.
        status: u16,
    },

    /// The deletion request did not reach the server or got no answer.
    #[error("Failed to delete message {id}: {reason}")]
    Transport {
        /// Message the deletion targeted.
        id: MessageId,
        /// Underlying failure.
        reason: String,
    },

    /// A deletion for the same message is still waiting for the server.
    #[error("Message {0} is already being deleted")]
    DeleteInProgress(MessageId),
}

impl MutationError {
    /// Builds the mutation error for a failed delete request.
    #[must_use]
    pub fn from_fetch(id: MessageId, err: FetchError) -> Self {
        match err {
            FetchError::Status(status) => Self::Rejected { id, status },
            FetchError::Network(reason) | FetchError::Decode(reason) => {
                Self::Transport { id, reason }
            }
        }
    }
}

/// Durable preference storage failure. Persistence is best-effort.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document is not valid JSON.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The store refuses writes (quota, read-only profile, ...).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Local notification failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// The user refused the notification capability.
    #[error("Notification permission denied")]
    PermissionDenied,

    /// The platform could not display the notification.
    #[error("Notification failed: {0}")]
    Platform(String),
}

/// Result type alias for preference storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
