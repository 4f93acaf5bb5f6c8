//! Error types for remote progress backends.

use thiserror::Error;

/// Errors returned by a [`RemoteBackend`](super::RemoteBackend).
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The write was rejected because the stored version moved on.
    #[error("remote document {key} changed since it was read")]
    Conflict { key: String },

    /// Backend is missing required settings.
    #[error("remote backend not configured: {0}")]
    NotConfigured(String),

    /// Network or transport failure.
    #[error("remote backend unreachable: {0}")]
    Unavailable(String),

    /// The service answered with an error status.
    #[error("remote API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The service answered with something we could not decode.
    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Unavailable(e.to_string())
        }
    }
}
