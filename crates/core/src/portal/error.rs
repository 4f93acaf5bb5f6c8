//! Error types for the portal module.

use std::path::PathBuf;
use thiserror::Error;

use super::types::{DropdownLevel, ProcessStep};

/// Errors raised by portal drivers and option sources.
#[derive(Debug, Error)]
pub enum PortalError {
    /// The automation driver could not be started or has died.
    #[error("portal driver unavailable: {0}")]
    DriverUnavailable(String),

    /// A form interaction did not take effect.
    #[error("portal navigation failed: {0}")]
    Navigation(String),

    /// The driver answered with something that is not a protocol message.
    #[error("portal driver protocol error: {0}")]
    Protocol(String),

    /// The driver did not answer in time.
    #[error("portal driver timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// A static option catalog could not be read.
    #[error("failed to load option catalog {path}: {reason}")]
    CatalogLoad { path: PathBuf, reason: String },

    /// Options were requested with the wrong number of parent selections.
    #[error("{level} options need {expected} parent selections, got {actual}")]
    InvalidParents {
        level: DropdownLevel,
        expected: usize,
        actual: usize,
    },
}

impl PortalError {
    /// Whether the error means the portal cannot be used for the rest of the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PortalError::DriverUnavailable(_))
    }
}

/// Errors from processing one task.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// A step of the form flow failed; the task may be retried.
    #[error("step '{step}' failed: {detail}")]
    StepFailed { step: ProcessStep, detail: String },

    /// The portal can no longer be driven.
    #[error("portal unavailable: {0}")]
    Unavailable(String),
}

impl ProcessError {
    pub fn step_failed(step: ProcessStep, detail: impl Into<String>) -> Self {
        Self::StepFailed {
            step,
            detail: detail.into(),
        }
    }
}
