//! Mock task runner for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::portal::{ProcessError, ProcessStep, TaskOutcome, TaskRunner};
use crate::progress::TaskKey;

/// Mock implementation of [`TaskRunner`].
///
/// Succeeds by default. Failures can be scripted per task or globally, and
/// every attempt is recorded for assertions.
#[derive(Debug)]
pub struct MockTaskRunner {
    /// Remaining forced failures per task key.
    failures: Arc<RwLock<HashMap<String, u32>>>,
    fail_all: Arc<RwLock<bool>>,
    unavailable: Arc<RwLock<bool>>,
    documents: Arc<RwLock<u32>>,
    attempts: Arc<RwLock<Vec<TaskKey>>>,
}

impl Default for MockTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskRunner {
    pub fn new() -> Self {
        Self {
            failures: Arc::new(RwLock::new(HashMap::new())),
            fail_all: Arc::new(RwLock::new(false)),
            unavailable: Arc::new(RwLock::new(false)),
            documents: Arc::new(RwLock::new(1)),
            attempts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Fail the next `times` attempts at `task`.
    pub async fn fail_task(&self, task: &TaskKey, times: u32) {
        self.failures.write().await.insert(task.key(), times);
    }

    /// Fail every attempt at every task.
    pub async fn fail_all(&self, fail: bool) {
        *self.fail_all.write().await = fail;
    }

    /// Report the portal as gone on every attempt.
    pub async fn set_unavailable(&self) {
        *self.unavailable.write().await = true;
    }

    pub async fn set_documents(&self, documents: u32) {
        *self.documents.write().await = documents;
    }

    /// Every task attempted, in order, including failed attempts.
    pub async fn attempts(&self) -> Vec<TaskKey> {
        self.attempts.read().await.clone()
    }

    pub async fn attempt_count(&self) -> usize {
        self.attempts.read().await.len()
    }
}

#[async_trait]
impl TaskRunner for MockTaskRunner {
    async fn process(&self, task: &TaskKey) -> Result<TaskOutcome, ProcessError> {
        self.attempts.write().await.push(task.clone());

        if *self.unavailable.read().await {
            return Err(ProcessError::Unavailable("mock portal is down".to_string()));
        }

        let forced = {
            let mut failures = self.failures.write().await;
            match failures.get_mut(&task.key()) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if forced || *self.fail_all.read().await {
            return Err(ProcessError::step_failed(
                ProcessStep::SubmitForm,
                "scripted failure",
            ));
        }

        Ok(TaskOutcome {
            documents: *self.documents.read().await,
        })
    }
}
