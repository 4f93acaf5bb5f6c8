//! Progress record: what has been harvested, what is in flight, and which
//! worker holds which task.
//!
//! The record is a single JSON document shared by every worker. It is kept
//! in a local file and optionally mirrored to a remote backend, and replicas
//! are reconciled with [`merge`].

mod error;
mod merge;
mod store;
mod types;
mod wire;

pub use error::{ProgressError, TaskKeyError};
pub use merge::{merge, Authority};
pub use store::{ProgressStore, RemoteSync, SaveReport};
pub use types::{
    LeaseSummary, ProgressRecord, ProgressSummary, TaskKey, WorkerLease, TASK_KEY_DELIMITER,
};
