//! Local progress file with an optional remote mirror.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::ProgressError;
use super::merge::{merge, Authority};
use super::types::ProgressRecord;
use crate::remote::{RemoteBackend, RemoteError, VersionToken};

/// Outcome of mirroring a save to the remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSync {
    /// No remote backend is configured.
    Disabled,
    /// The merged record was written; `attempts` counts conflicting retries plus one.
    Synced { attempts: u32 },
    /// The local file was written but the remote copy was not.
    Failed { reason: String },
}

impl RemoteSync {
    pub fn is_synced(&self) -> bool {
        matches!(self, RemoteSync::Synced { .. })
    }
}

/// Result of [`ProgressStore::save`].
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub remote: RemoteSync,
    /// The record as last written: the caller's record merged with whatever
    /// the remote held. Completions from other workers show up here.
    pub merged: ProgressRecord,
}

struct RemoteTarget {
    backend: Arc<dyn RemoteBackend>,
    key: String,
}

/// Reads and writes the progress document.
///
/// The local file is always written first and atomically (temp file plus
/// rename). When a remote backend is attached, saves merge with the remote
/// copy and retry on version conflicts, so completions written by other
/// workers are never dropped.
pub struct ProgressStore {
    path: PathBuf,
    remote: Option<RemoteTarget>,
    worker_id: Option<String>,
    max_write_attempts: u32,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remote: None,
            worker_id: None,
            max_write_attempts: 3,
        }
    }

    /// Mirror the document to `backend` under `key`.
    pub fn with_remote(mut self, backend: Arc<dyn RemoteBackend>, key: impl Into<String>) -> Self {
        self.remote = Some(RemoteTarget {
            backend,
            key: key.into(),
        });
        self
    }

    /// The worker whose lease this store's saves are authoritative for.
    pub fn with_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Load the freshest view of progress.
    ///
    /// With a remote attached, the remote copy is authoritative for `current`
    /// and `last_run` and is merged with the local file. An unreachable or
    /// corrupt remote falls back to the local file; a missing or corrupt
    /// local file falls back to the remote. With neither, an empty record.
    pub async fn load(&self) -> Result<ProgressRecord, ProgressError> {
        let local = self.read_local().await;

        let Some(remote) = self.fetch_remote().await else {
            return Ok(local?.unwrap_or_default());
        };

        match local {
            Ok(Some(local)) => Ok(merge(&local, &remote, Authority::Remote)),
            Ok(None) => Ok(remote),
            Err(e) => {
                warn!("Ignoring unreadable local progress, using remote copy: {}", e);
                Ok(remote)
            }
        }
    }

    /// Persist `record` locally, then mirror it to the remote.
    ///
    /// Remote problems never fail the save; they are reported in
    /// [`SaveReport::remote`]. A remote document that cannot be decoded is
    /// left untouched.
    pub async fn save(&self, record: &ProgressRecord) -> Result<SaveReport, ProgressError> {
        self.write_local(record).await?;

        let Some(target) = &self.remote else {
            return Ok(SaveReport {
                remote: RemoteSync::Disabled,
                merged: record.clone(),
            });
        };

        let mut merged = record.clone();
        for attempt in 1..=self.max_write_attempts {
            let (remote, version) = match target.backend.fetch(&target.key).await {
                Ok(Some(doc)) => match decode(&doc.body) {
                    Ok(remote) => (remote, Some(doc.version)),
                    Err(reason) => {
                        warn!(
                            "Remote progress on {} is corrupt, not overwriting it: {}",
                            target.backend.name(),
                            reason
                        );
                        return Ok(failed(
                            format!("remote document is corrupt: {}", reason),
                            merged,
                        ));
                    }
                },
                Ok(None) => (ProgressRecord::default(), None),
                Err(e) => {
                    warn!("Failed to read remote progress from {}: {}", target.backend.name(), e);
                    return Ok(failed(e.to_string(), merged));
                }
            };

            merged = self.merge_for_write(record, &remote);
            let body = serde_json::to_vec_pretty(&merged)?;

            match target
                .backend
                .write(&target.key, &body, version.as_ref())
                .await
            {
                Ok(_) => {
                    if &merged != record {
                        self.write_local(&merged).await?;
                    }
                    debug!(
                        "Progress synced to {} ({} completed, attempt {})",
                        target.backend.name(),
                        merged.completed().len(),
                        attempt
                    );
                    return Ok(SaveReport {
                        remote: RemoteSync::Synced { attempts: attempt },
                        merged,
                    });
                }
                Err(RemoteError::Conflict { .. }) => {
                    debug!(
                        "Remote progress changed during save (attempt {}/{}), retrying",
                        attempt, self.max_write_attempts
                    );
                }
                Err(e) => {
                    warn!("Failed to write remote progress to {}: {}", target.backend.name(), e);
                    return Ok(failed(e.to_string(), merged));
                }
            }
        }

        warn!(
            "Gave up syncing progress to {} after {} conflicting writes",
            target.backend.name(),
            self.max_write_attempts
        );
        Ok(failed(
            format!(
                "remote kept changing, gave up after {} attempts",
                self.max_write_attempts
            ),
            merged,
        ))
    }

    /// Replace the stored progress, local and remote, with an empty record.
    pub async fn reset(&self) -> Result<RemoteSync, ProgressError> {
        let empty = ProgressRecord::default();
        self.write_local(&empty).await?;
        info!("Reset local progress at {}", self.path.display());

        let Some(target) = &self.remote else {
            return Ok(RemoteSync::Disabled);
        };

        let body = serde_json::to_vec_pretty(&empty)?;
        for attempt in 1..=self.max_write_attempts {
            let version: Option<VersionToken> = match target.backend.fetch(&target.key).await {
                Ok(doc) => doc.map(|doc| doc.version),
                Err(e) => return Ok(RemoteSync::Failed { reason: e.to_string() }),
            };
            match target
                .backend
                .write(&target.key, &body, version.as_ref())
                .await
            {
                Ok(_) => {
                    info!("Reset remote progress on {}", target.backend.name());
                    return Ok(RemoteSync::Synced { attempts: attempt });
                }
                Err(RemoteError::Conflict { .. }) => continue,
                Err(e) => return Ok(RemoteSync::Failed { reason: e.to_string() }),
            }
        }
        Ok(RemoteSync::Failed {
            reason: format!(
                "remote kept changing, gave up after {} attempts",
                self.max_write_attempts
            ),
        })
    }

    /// The caller's record wins `current`; its own worker lease is kept even
    /// if the remote copy carries a later timestamp for it.
    fn merge_for_write(&self, record: &ProgressRecord, remote: &ProgressRecord) -> ProgressRecord {
        let mut merged = merge(record, remote, Authority::Local);
        if let Some(worker_id) = &self.worker_id {
            if let Some(lease) = record.worker_leases.get(worker_id) {
                merged
                    .worker_leases
                    .insert(worker_id.clone(), lease.clone());
            }
        }
        merged
    }

    async fn fetch_remote(&self) -> Option<ProgressRecord> {
        let target = self.remote.as_ref()?;
        match target.backend.fetch(&target.key).await {
            Ok(Some(doc)) => match decode(&doc.body) {
                Ok(record) => Some(record),
                Err(reason) => {
                    warn!(
                        "Ignoring corrupt remote progress on {}: {}",
                        target.backend.name(),
                        reason
                    );
                    None
                }
            },
            Ok(None) => {
                debug!("No remote progress on {} yet", target.backend.name());
                None
            }
            Err(e) => {
                warn!(
                    "Remote progress unavailable on {}, using local copy: {}",
                    target.backend.name(),
                    e
                );
                None
            }
        }
    }

    async fn read_local(&self) -> Result<Option<ProgressRecord>, ProgressError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProgressError::io(&self.path, e)),
        };
        decode(&bytes)
            .map(Some)
            .map_err(|reason| ProgressError::Corrupt {
                path: self.path.clone(),
                reason,
            })
    }

    async fn write_local(&self, record: &ProgressRecord) -> Result<(), ProgressError> {
        let body = serde_json::to_vec_pretty(record)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProgressError::io(parent, e))?;
        }

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| ProgressError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ProgressError::io(&self.path, e))?;
        Ok(())
    }
}

fn failed(reason: String, merged: ProgressRecord) -> SaveReport {
    SaveReport {
        remote: RemoteSync::Failed { reason },
        merged,
    }
}

fn decode(bytes: &[u8]) -> Result<ProgressRecord, String> {
    serde_json::from_slice(bytes).map_err(|e| e.to_string())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "progress.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
