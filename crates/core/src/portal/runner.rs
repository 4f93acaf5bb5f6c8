//! Portal-backed option source and task runner.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::error::{PortalError, ProcessError};
use super::traits::{check_parents, OptionSource, PortalSession, TaskRunner};
use super::types::{dropdown_path, DropdownLevel, ProcessStep, TaskOutcome};
use crate::progress::TaskKey;

/// Reads dropdown options off the live form.
///
/// Each lookup opens a fresh search page and selects the parent values in
/// order. Non-empty answers are cached for the lifetime of the source.
pub struct SessionOptionSource {
    session: Arc<dyn PortalSession>,
    cache: Mutex<HashMap<(DropdownLevel, Vec<String>), Vec<String>>>,
}

impl SessionOptionSource {
    pub fn new(session: Arc<dyn PortalSession>) -> Self {
        Self {
            session,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn navigation_error(&self, what: String) -> PortalError {
        if self.session.is_available() {
            PortalError::Navigation(what)
        } else {
            PortalError::DriverUnavailable(format!("session lost: {}", what))
        }
    }
}

#[async_trait]
impl OptionSource for SessionOptionSource {
    async fn options(
        &self,
        level: DropdownLevel,
        parents: &[String],
    ) -> Result<Vec<String>, PortalError> {
        check_parents(level, parents)?;

        let cache_key = (level, parents.to_vec());
        if let Some(cached) = self.cache.lock().await.get(&cache_key) {
            return Ok(cached.clone());
        }

        if !self.session.is_available() {
            return Err(PortalError::DriverUnavailable(
                "portal session is not available".to_string(),
            ));
        }

        if !self.session.open_search_page().await {
            return Err(self.navigation_error("could not open the search page".to_string()));
        }
        for (parent_level, value) in DropdownLevel::ALL.iter().zip(parents) {
            if !self.session.select_option(*parent_level, value).await {
                return Err(self.navigation_error(format!(
                    "could not select {} '{}'",
                    parent_level, value
                )));
            }
        }

        let options = self.session.dropdown_options(level).await;
        if options.is_empty() {
            if !self.session.is_available() {
                return Err(PortalError::DriverUnavailable(format!(
                    "session lost while reading {} options",
                    level
                )));
            }
            debug!("No {} options under {:?}", level, parents);
        } else {
            self.cache.lock().await.insert(cache_key, options.clone());
        }
        Ok(options)
    }
}

/// Drives a [`PortalSession`] through the search flow for one task.
///
/// Any failed step fails the task. Results are only ever what the portal
/// returned; nothing is synthesized when a step fails.
pub struct PortalTaskRunner {
    session: Arc<dyn PortalSession>,
    captcha_attempts: u32,
}

impl PortalTaskRunner {
    pub fn new(session: Arc<dyn PortalSession>, captcha_attempts: u32) -> Self {
        Self {
            session,
            captcha_attempts: captcha_attempts.max(1),
        }
    }

    fn fail(&self, step: ProcessStep, detail: impl Into<String>) -> ProcessError {
        let detail = detail.into();
        if self.session.is_available() {
            ProcessError::step_failed(step, detail)
        } else {
            ProcessError::Unavailable(format!("session lost during {}: {}", step, detail))
        }
    }

    async fn solve_captcha(&self) -> Result<(), ProcessError> {
        for attempt in 1..=self.captcha_attempts {
            if !self.session.solve_captcha().await.is_empty() {
                return Ok(());
            }
            if !self.session.is_available() {
                break;
            }
            warn!(
                "CAPTCHA attempt {}/{} failed",
                attempt, self.captcha_attempts
            );
        }
        Err(self.fail(
            ProcessStep::SolveCaptcha,
            format!("no answer after {} attempts", self.captcha_attempts),
        ))
    }
}

#[async_trait]
impl TaskRunner for PortalTaskRunner {
    async fn process(&self, task: &TaskKey) -> Result<TaskOutcome, ProcessError> {
        if !self.session.is_available() {
            return Err(ProcessError::Unavailable(
                "portal session is not available".to_string(),
            ));
        }

        info!(
            "Processing: Year={}, District={}, Taluka={}, Village={}, Doc#={}",
            task.year(),
            task.district(),
            task.taluka(),
            task.village(),
            task.doc_number()
        );

        if !self.session.open_search_page().await {
            return Err(self.fail(ProcessStep::OpenSearchPage, "search page did not load"));
        }

        for (level, label) in dropdown_path(task) {
            if !self.session.select_option(level, label).await {
                return Err(self.fail(
                    ProcessStep::Select(level),
                    format!("option '{}' not selectable", label),
                ));
            }
        }

        if !self.session.enter_doc_number(task.doc_number()).await {
            return Err(self.fail(
                ProcessStep::EnterDocNumber,
                "document number field not found",
            ));
        }

        self.solve_captcha().await?;

        if !self.session.submit_form().await {
            return Err(self.fail(ProcessStep::SubmitForm, "search was not accepted"));
        }

        let documents = self.session.download_results().await;
        if documents == 0 && !self.session.is_available() {
            return Err(self.fail(ProcessStep::DownloadResults, "no results retrieved"));
        }

        info!("Downloaded {} document(s) for {}", documents, task);
        Ok(TaskOutcome { documents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockPortal};

    fn task(doc_number: u32) -> TaskKey {
        TaskKey::new("2024", "Pune", "Haveli", "Hadapsar", doc_number).unwrap()
    }

    #[tokio::test]
    async fn test_process_runs_full_flow() {
        let portal = Arc::new(MockPortal::new(fixtures::catalog()));
        portal.set_documents(3).await;
        let runner = PortalTaskRunner::new(portal.clone(), 2);

        let outcome = runner.process(&task(4)).await.unwrap();
        assert_eq!(outcome.documents, 3);

        let calls = portal.calls().await;
        assert_eq!(calls.first().map(String::as_str), Some("open_search_page"));
        assert!(calls.contains(&"select_option village Hadapsar".to_string()));
        assert!(calls.contains(&"enter_doc_number 4".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("download_results"));
    }

    #[tokio::test]
    async fn test_unknown_village_fails_select_step() {
        let portal = Arc::new(MockPortal::new(fixtures::catalog()));
        let runner = PortalTaskRunner::new(portal.clone(), 2);
        let missing = TaskKey::new("2024", "Pune", "Haveli", "Nowhere", 1).unwrap();

        let err = runner.process(&missing).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessError::StepFailed {
                step: ProcessStep::Select(DropdownLevel::Village),
                ..
            }
        ));
        assert_eq!(portal.download_count().await, 0);
    }

    #[tokio::test]
    async fn test_captcha_retried_within_attempts() {
        let portal = Arc::new(MockPortal::new(fixtures::catalog()));
        portal.fail_step(ProcessStep::SolveCaptcha, 1).await;

        let runner = PortalTaskRunner::new(portal.clone(), 2);
        assert!(runner.process(&task(1)).await.is_ok());

        portal.fail_step(ProcessStep::SolveCaptcha, 2).await;
        let err = runner.process(&task(1)).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessError::StepFailed {
                step: ProcessStep::SolveCaptcha,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_lost_session_is_unavailable() {
        let portal = Arc::new(MockPortal::new(fixtures::catalog()));
        portal.set_available(false);

        let runner = PortalTaskRunner::new(portal.clone(), 2);
        let err = runner.process(&task(1)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_session_options_follow_parents() {
        let portal = Arc::new(MockPortal::new(fixtures::catalog()));
        let source = SessionOptionSource::new(portal.clone());

        let years = source.options(DropdownLevel::Year, &[]).await.unwrap();
        assert_eq!(years, ["2023", "2024"]);

        let parents = vec!["2024".to_string(), "Pune".to_string(), "Haveli".to_string()];
        let villages = source
            .options(DropdownLevel::Village, &parents)
            .await
            .unwrap();
        assert_eq!(villages, ["Hadapsar", "Wagholi"]);

        // second lookup is served from the cache
        let before = portal.calls().await.len();
        source
            .options(DropdownLevel::Village, &parents)
            .await
            .unwrap();
        assert_eq!(portal.calls().await.len(), before);
    }

    #[tokio::test]
    async fn test_session_options_report_bad_parent() {
        let portal = Arc::new(MockPortal::new(fixtures::catalog()));
        let source = SessionOptionSource::new(portal.clone());

        let err = source
            .options(DropdownLevel::Taluka, &["2024".to_string(), "Nagpur".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Navigation(_)));

        portal.set_available(false);
        let err = source.options(DropdownLevel::Year, &[]).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
