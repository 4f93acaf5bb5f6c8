//! Remote mirrors for the shared progress document.
//!
//! A backend stores one opaque document per key and hands back a version
//! token with every read and write. Merging and retry policy live in
//! [`ProgressStore`](crate::progress::ProgressStore); backends only move bytes.

mod config;
mod error;
mod github;
mod s3;
mod traits;

pub use config::{GitHubConfig, RemoteBackendKind, RemoteConfig, S3Config};
pub use error::RemoteError;
pub use github::GitHubBackend;
pub use s3::S3Backend;
pub use traits::{RemoteBackend, RemoteDocument, VersionToken};

use std::sync::Arc;

/// Build the configured backend. `Ok(None)` when the mirror is disabled.
pub async fn create_remote_backend(
    config: &RemoteConfig,
) -> Result<Option<Arc<dyn RemoteBackend>>, RemoteError> {
    if !config.enabled {
        return Ok(None);
    }

    let backend: Arc<dyn RemoteBackend> = match config.backend {
        RemoteBackendKind::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                RemoteError::NotConfigured("remote.s3 section is required".to_string())
            })?;
            Arc::new(S3Backend::new(s3).await?)
        }
        RemoteBackendKind::GitHub => {
            let github = config.github.as_ref().ok_or_else(|| {
                RemoteError::NotConfigured("remote.github section is required".to_string())
            })?;
            Arc::new(GitHubBackend::new(github)?)
        }
    };

    Ok(Some(backend))
}
