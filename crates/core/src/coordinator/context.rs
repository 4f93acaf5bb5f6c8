//! Explicit per-worker context.

use tracing::{info_span, Span};

use crate::progress::ProgressStore;

/// Identity, progress store and log span of one worker process.
///
/// Built once at startup and handed to the coordinator; nothing about the
/// worker lives in globals.
pub struct WorkerContext {
    worker_id: String,
    store: ProgressStore,
    span: Span,
}

impl WorkerContext {
    pub fn new(worker_id: impl Into<String>, store: ProgressStore) -> Self {
        let worker_id = worker_id.into();
        let span = info_span!("worker", worker_id = %worker_id);
        Self {
            store: store.with_worker(worker_id.clone()),
            worker_id,
            span,
        }
    }

    /// A fresh identity of the form `worker_1a2b3c4d`.
    pub fn generate_worker_id() -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("worker_{}", &id[..8])
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = WorkerContext::generate_worker_id();
        let b = WorkerContext::generate_worker_id();
        assert!(a.starts_with("worker_"));
        assert_eq!(a.len(), "worker_".len() + 8);
        assert_ne!(a, b);
    }
}
