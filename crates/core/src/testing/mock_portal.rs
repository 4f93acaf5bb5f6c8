//! Mock portal session for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::portal::{DropdownLevel, PortalSession, ProcessStep, StaticCatalog};

/// Mock implementation of [`PortalSession`] backed by a [`StaticCatalog`].
///
/// The mock tracks the selections made since the last `open_search_page`,
/// so dropdowns only offer options consistent with their parents, the way
/// the live form does. Individual steps can be made to fail a number of
/// times, and the whole session can be marked unavailable.
///
/// # Example
///
/// ```rust,ignore
/// use harvest_core::testing::{fixtures, MockPortal};
///
/// let portal = Arc::new(MockPortal::new(fixtures::catalog()));
/// portal.fail_step(ProcessStep::SolveCaptcha, 1).await;
///
/// let runner = PortalTaskRunner::new(portal.clone(), 2);
/// runner.process(&task).await?;
/// assert_eq!(portal.download_count().await, 1);
/// ```
pub struct MockPortal {
    catalog: StaticCatalog,
    /// Selections made on the current page, in form order.
    selections: Arc<RwLock<Vec<String>>>,
    doc_number: Arc<RwLock<Option<u32>>>,
    /// Remaining forced failures per step.
    failures: Arc<RwLock<HashMap<ProcessStep, u32>>>,
    documents: Arc<RwLock<u32>>,
    calls: Arc<RwLock<Vec<String>>>,
    downloads: Arc<RwLock<u32>>,
    available: AtomicBool,
}

impl std::fmt::Debug for MockPortal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPortal")
            .field("catalog", &self.catalog)
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

impl MockPortal {
    pub fn new(catalog: StaticCatalog) -> Self {
        Self {
            catalog,
            selections: Arc::new(RwLock::new(Vec::new())),
            doc_number: Arc::new(RwLock::new(None)),
            failures: Arc::new(RwLock::new(HashMap::new())),
            documents: Arc::new(RwLock::new(1)),
            calls: Arc::new(RwLock::new(Vec::new())),
            downloads: Arc::new(RwLock::new(0)),
            available: AtomicBool::new(true),
        }
    }

    /// Make `step` fail the next `times` times it is attempted.
    pub async fn fail_step(&self, step: ProcessStep, times: u32) {
        self.failures.write().await.insert(step, times);
    }

    /// Documents reported by each `download_results`.
    pub async fn set_documents(&self, documents: u32) {
        *self.documents.write().await = documents;
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Every call made so far, e.g. `"select_option district Pune"`.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }

    /// Number of successful `download_results` calls.
    pub async fn download_count(&self) -> u32 {
        *self.downloads.read().await
    }

    async fn record(&self, call: String) {
        self.calls.write().await.push(call);
    }

    /// Consume one forced failure for `step`, if any remain.
    async fn forced_failure(&self, step: ProcessStep) -> bool {
        let mut failures = self.failures.write().await;
        match failures.get_mut(&step) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn up(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortalSession for MockPortal {
    async fn open_search_page(&self) -> bool {
        self.record("open_search_page".to_string()).await;
        if !self.up() || self.forced_failure(ProcessStep::OpenSearchPage).await {
            return false;
        }
        self.selections.write().await.clear();
        *self.doc_number.write().await = None;
        true
    }

    async fn dropdown_options(&self, level: DropdownLevel) -> Vec<String> {
        self.record(format!("dropdown_options {}", level)).await;
        if !self.up() {
            return Vec::new();
        }
        let selections = self.selections.read().await;
        if selections.len() != level.depth() {
            return Vec::new();
        }
        self.catalog.lookup(level, &selections)
    }

    async fn select_option(&self, level: DropdownLevel, label: &str) -> bool {
        self.record(format!("select_option {} {}", level, label)).await;
        if !self.up() || self.forced_failure(ProcessStep::Select(level)).await {
            return false;
        }

        let mut selections = self.selections.write().await;
        // re-selecting an outer level resets the dropdowns below it
        selections.truncate(level.depth());
        if selections.len() != level.depth() {
            return false;
        }
        if !self.catalog.lookup(level, &selections).iter().any(|o| o == label) {
            return false;
        }
        selections.push(label.to_string());
        true
    }

    async fn enter_doc_number(&self, doc_number: u32) -> bool {
        self.record(format!("enter_doc_number {}", doc_number)).await;
        if !self.up() || self.forced_failure(ProcessStep::EnterDocNumber).await {
            return false;
        }
        *self.doc_number.write().await = Some(doc_number);
        true
    }

    async fn solve_captcha(&self) -> String {
        self.record("solve_captcha".to_string()).await;
        if !self.up() || self.forced_failure(ProcessStep::SolveCaptcha).await {
            return String::new();
        }
        "X7K2P".to_string()
    }

    async fn submit_form(&self) -> bool {
        self.record("submit_form".to_string()).await;
        if !self.up() || self.forced_failure(ProcessStep::SubmitForm).await {
            return false;
        }
        self.selections.read().await.len() == DropdownLevel::ALL.len()
            && self.doc_number.read().await.is_some()
    }

    async fn download_results(&self) -> u32 {
        self.record("download_results".to_string()).await;
        if !self.up() || self.forced_failure(ProcessStep::DownloadResults).await {
            return 0;
        }
        *self.downloads.write().await += 1;
        *self.documents.read().await
    }

    fn is_available(&self) -> bool {
        self.up()
    }
}
