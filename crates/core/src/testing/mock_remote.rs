//! Mock remote backend for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::progress::ProgressRecord;
use crate::remote::{RemoteBackend, RemoteDocument, RemoteError, VersionToken};

#[derive(Debug, Clone)]
struct StoredDocument {
    body: Vec<u8>,
    revision: u64,
}

impl StoredDocument {
    fn version(&self) -> VersionToken {
        VersionToken(format!("rev-{}", self.revision))
    }
}

/// In-memory [`RemoteBackend`] with conditional writes.
///
/// Behaves like the GitHub backend: a write whose expected version does not
/// match the stored one is rejected with [`RemoteError::Conflict`]. Several
/// stores can share one instance through an `Arc` to model workers on
/// different machines.
///
/// # Example
///
/// ```rust,ignore
/// use harvest_core::testing::MockRemoteBackend;
///
/// let remote = Arc::new(MockRemoteBackend::new());
/// remote.set_conflicts(1).await;
///
/// let store = ProgressStore::new(path).with_remote(remote.clone(), "progress.json");
/// let report = store.save(&record).await?;
/// assert_eq!(report.remote, RemoteSync::Synced { attempts: 2 });
/// ```
#[derive(Debug)]
pub struct MockRemoteBackend {
    documents: Arc<RwLock<HashMap<String, StoredDocument>>>,
    next_revision: Arc<RwLock<u64>>,
    /// If set, the next fetch fails with this error.
    next_fetch_error: Arc<RwLock<Option<RemoteError>>>,
    /// If set, the next write fails with this error.
    next_write_error: Arc<RwLock<Option<RemoteError>>>,
    /// Number of upcoming writes to reject as conflicts.
    conflicts: Arc<RwLock<u32>>,
    /// Document written "by someone else" just before the next write lands.
    interleaved: Arc<RwLock<Option<(String, Vec<u8>)>>>,
    fetches: Arc<RwLock<u32>>,
    writes: Arc<RwLock<u32>>,
}

impl Default for MockRemoteBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteBackend {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            next_revision: Arc::new(RwLock::new(1)),
            next_fetch_error: Arc::new(RwLock::new(None)),
            next_write_error: Arc::new(RwLock::new(None)),
            conflicts: Arc::new(RwLock::new(0)),
            interleaved: Arc::new(RwLock::new(None)),
            fetches: Arc::new(RwLock::new(0)),
            writes: Arc::new(RwLock::new(0)),
        }
    }

    /// Store raw bytes under `key`, bumping its version.
    pub async fn set_raw(&self, key: &str, body: Vec<u8>) {
        let revision = self.bump_revision().await;
        self.documents
            .write()
            .await
            .insert(key.to_string(), StoredDocument { body, revision });
    }

    /// Store a serialized record under `key`.
    pub async fn set_record(&self, key: &str, record: &ProgressRecord) {
        let body = serde_json::to_vec_pretty(record).expect("record serializes");
        self.set_raw(key, body).await;
    }

    /// Raw bytes currently stored under `key`.
    pub async fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.documents
            .read()
            .await
            .get(key)
            .map(|doc| doc.body.clone())
    }

    /// Decoded record currently stored under `key`.
    pub async fn record(&self, key: &str) -> Option<ProgressRecord> {
        let raw = self.raw(key).await?;
        serde_json::from_slice(&raw).ok()
    }

    /// Remove the document under `key`.
    pub async fn remove(&self, key: &str) {
        self.documents.write().await.remove(key);
    }

    pub async fn set_next_fetch_error(&self, error: RemoteError) {
        *self.next_fetch_error.write().await = Some(error);
    }

    pub async fn set_next_write_error(&self, error: RemoteError) {
        *self.next_write_error.write().await = Some(error);
    }

    /// Reject the next `count` writes as conflicts.
    pub async fn set_conflicts(&self, count: u32) {
        *self.conflicts.write().await = count;
    }

    /// Simulate another worker writing `record` between the caller's fetch
    /// and its next write.
    pub async fn set_interleaved_record(&self, key: &str, record: &ProgressRecord) {
        let body = serde_json::to_vec_pretty(record).expect("record serializes");
        *self.interleaved.write().await = Some((key.to_string(), body));
    }

    pub async fn fetch_count(&self) -> u32 {
        *self.fetches.read().await
    }

    /// Number of write attempts, including rejected ones.
    pub async fn write_count(&self) -> u32 {
        *self.writes.read().await
    }

    async fn bump_revision(&self) -> u64 {
        let mut next = self.next_revision.write().await;
        let revision = *next;
        *next += 1;
        revision
    }
}

#[async_trait]
impl RemoteBackend for MockRemoteBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, key: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        *self.fetches.write().await += 1;

        if let Some(error) = self.next_fetch_error.write().await.take() {
            return Err(error);
        }

        Ok(self.documents.read().await.get(key).map(|doc| RemoteDocument {
            body: doc.body.clone(),
            version: doc.version(),
        }))
    }

    async fn write(
        &self,
        key: &str,
        body: &[u8],
        expected: Option<&VersionToken>,
    ) -> Result<VersionToken, RemoteError> {
        *self.writes.write().await += 1;

        if let Some(error) = self.next_write_error.write().await.take() {
            return Err(error);
        }

        let interleaved = self.interleaved.write().await.take();
        if let Some((other_key, other_body)) = interleaved {
            self.set_raw(&other_key, other_body).await;
        }

        {
            let mut conflicts = self.conflicts.write().await;
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(RemoteError::Conflict {
                    key: key.to_string(),
                });
            }
        }

        let revision = self.bump_revision().await;
        let mut documents = self.documents.write().await;
        let current = documents.get(key).map(StoredDocument::version);
        if current.as_ref() != expected {
            return Err(RemoteError::Conflict {
                key: key.to_string(),
            });
        }

        let doc = StoredDocument {
            body: body.to_vec(),
            revision,
        };
        let version = doc.version();
        documents.insert(key.to_string(), doc);
        Ok(version)
    }
}
