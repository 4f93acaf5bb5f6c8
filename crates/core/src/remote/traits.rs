//! Trait definitions for remote progress backends.

use async_trait::async_trait;

use super::error::RemoteError;

/// Opaque revision identifier handed back by a backend (ETag, blob SHA, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(pub String);

impl VersionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A fetched document together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct RemoteDocument {
    pub body: Vec<u8>,
    pub version: VersionToken,
}

/// A remote mirror for the progress document.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Fetch the document stored at `key`. `Ok(None)` means it does not exist.
    async fn fetch(&self, key: &str) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Overwrite the document at `key`.
    ///
    /// `expected` is the version the caller read (`None` if the document did
    /// not exist). Backends that support conditional writes return
    /// [`RemoteError::Conflict`] when it no longer matches; others ignore it.
    async fn write(
        &self,
        key: &str,
        body: &[u8],
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, RemoteError>;
}
