//! Coordinator types and errors.

use serde::Serialize;
use thiserror::Error;

use crate::portal::PortalError;
use crate::progress::{ProgressError, TaskKey};

/// Errors that end a coordinator operation.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The portal or its driver is gone. Fatal to the run.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Reading the dropdown options failed this time around.
    #[error("task discovery failed: {0}")]
    Discovery(#[source] PortalError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl From<PortalError> for CoordinatorError {
    fn from(e: PortalError) -> Self {
        if e.is_fatal() {
            CoordinatorError::CollaboratorUnavailable(e.to_string())
        } else {
            CoordinatorError::Discovery(e)
        }
    }
}

/// Where a selected task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrigin {
    /// The record's `current` task, picked up again.
    Resumed,
    /// Found by walking the dropdown options.
    Discovered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub task: TaskKey,
    pub origin: SelectionOrigin,
}

/// Result of trying to claim a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyCompleted,
    /// Another worker holds a live lease on the task.
    Leased { worker_id: String },
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every combination is completed or leased.
    NoTaskAvailable,
    DailyLimitReached,
    /// `max_tasks_per_run` tasks were completed.
    RunQuotaReached,
    /// `max_attempts` loop iterations were used up.
    AttemptsExhausted,
}

/// Totals for one [`run`](super::TaskCoordinator::run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: u32,
    pub failed: u32,
    pub attempts: u32,
    pub documents: u64,
    pub stop: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_loss_converts_to_fatal() {
        let err: CoordinatorError = PortalError::DriverUnavailable("exited".into()).into();
        assert!(matches!(err, CoordinatorError::CollaboratorUnavailable(_)));

        let err: CoordinatorError = PortalError::Navigation("no year dropdown".into()).into();
        assert!(matches!(err, CoordinatorError::Discovery(_)));
    }

    #[test]
    fn test_summary_serializes_stop_reason() {
        let summary = RunSummary {
            processed: 2,
            failed: 1,
            attempts: 3,
            documents: 7,
            stop: StopReason::DailyLimitReached,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["stop"], "daily_limit_reached");
    }
}
