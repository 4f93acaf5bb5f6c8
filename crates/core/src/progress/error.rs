//! Error types for the progress module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a [`TaskKey`](super::TaskKey).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskKeyError {
    /// A component was empty or whitespace.
    #[error("task key component `{field}` is empty")]
    EmptyComponent { field: &'static str },

    /// A component contains the key delimiter and could not be round-tripped.
    #[error("task key component `{field}` contains the delimiter '_': {value}")]
    DelimiterInComponent { field: &'static str, value: String },

    /// A joined key string did not have five well-formed parts.
    #[error("malformed task key: {0}")]
    Malformed(String),
}

/// Errors that can occur while reading or writing progress.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Local filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local progress file exists but does not hold a progress record.
    #[error("progress file {path} is not a valid progress record: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Failed to encode a record.
    #[error("failed to serialize progress record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ProgressError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
