//! Trait definitions for the portal collaborators.

use async_trait::async_trait;

use super::error::{PortalError, ProcessError};
use super::types::{DropdownLevel, TaskOutcome};
use crate::progress::TaskKey;

/// A live session on the registration search portal.
///
/// Interactions report failure as `false` or an empty result rather than an
/// error; a session that can no longer be driven at all says so through
/// [`is_available`](Self::is_available).
#[async_trait]
pub trait PortalSession: Send + Sync {
    /// Load a fresh search form.
    async fn open_search_page(&self) -> bool;

    /// Option labels currently offered by `level`, placeholder entries removed.
    async fn dropdown_options(&self, level: DropdownLevel) -> Vec<String>;

    async fn select_option(&self, level: DropdownLevel, label: &str) -> bool;

    async fn enter_doc_number(&self, doc_number: u32) -> bool;

    /// Read and fill in the CAPTCHA. Returns the text entered, empty on failure.
    async fn solve_captcha(&self) -> String;

    async fn submit_form(&self) -> bool;

    /// Save every listing on the results page. Returns how many were saved.
    async fn download_results(&self) -> u32;

    fn is_available(&self) -> bool {
        true
    }
}

/// Supplies the option lists of the cascading dropdowns.
#[async_trait]
pub trait OptionSource: Send + Sync {
    /// Options for `level` given the selections above it, outermost first.
    /// `parents.len()` must equal `level.depth()`.
    async fn options(
        &self,
        level: DropdownLevel,
        parents: &[String],
    ) -> Result<Vec<String>, PortalError>;
}

/// Performs the work for one task.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn process(&self, task: &TaskKey) -> Result<TaskOutcome, ProcessError>;
}

pub(crate) fn check_parents(level: DropdownLevel, parents: &[String]) -> Result<(), PortalError> {
    if parents.len() == level.depth() {
        Ok(())
    } else {
        Err(PortalError::InvalidParents {
            level,
            expected: level.depth(),
            actual: parents.len(),
        })
    }
}
