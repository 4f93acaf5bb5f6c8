//! The worker loop: select, claim, process, record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn, Instrument};

use super::config::{CoordinatorConfig, SelectionPolicy};
use super::context::WorkerContext;
use super::discovery;
use super::types::{
    ClaimOutcome, CoordinatorError, RunSummary, Selection, SelectionOrigin, StopReason,
};
use crate::portal::{OptionSource, ProcessError, TaskOutcome, TaskRunner};
use crate::progress::{merge, Authority, ProgressRecord, SaveReport, TaskKey, WorkerLease};

/// Counters for the current browsing session. Reset after a failed attempt.
#[derive(Debug, Clone, Copy)]
struct Session {
    started: DateTime<Utc>,
    requests: u32,
}

impl Session {
    fn new() -> Self {
        Self {
            started: Utc::now(),
            requests: 0,
        }
    }
}

/// Decides what this worker does next and keeps the progress record honest.
///
/// Every state change (claim, completion, abandonment) is persisted through
/// the context's [`ProgressStore`](crate::progress::ProgressStore) before the
/// coordinator moves on, and the merged document the store returns replaces
/// the in-memory record.
pub struct TaskCoordinator {
    context: WorkerContext,
    config: CoordinatorConfig,
    options: Arc<dyn OptionSource>,
    runner: Arc<dyn TaskRunner>,
    record: ProgressRecord,
    /// Completions by this process. Never reset; caps the process at `daily_limit`.
    daily_requests: u32,
    session: Session,
    /// Tasks abandoned by this process; not offered again until restart.
    skipped: HashSet<String>,
    rng: StdRng,
}

impl TaskCoordinator {
    /// Load progress through the context's store and build a coordinator.
    pub async fn start(
        context: WorkerContext,
        config: CoordinatorConfig,
        options: Arc<dyn OptionSource>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self, CoordinatorError> {
        let record = context.store().load().await?;
        info!(
            parent: context.span(),
            "Loaded progress: {} completed, {} worker lease(s)",
            record.completed().len(),
            record.worker_leases.len()
        );
        Ok(Self::from_record(context, config, options, runner, record))
    }

    pub fn from_record(
        context: WorkerContext,
        config: CoordinatorConfig,
        options: Arc<dyn OptionSource>,
        runner: Arc<dyn TaskRunner>,
        record: ProgressRecord,
    ) -> Self {
        Self {
            context,
            config,
            options,
            runner,
            record,
            daily_requests: 0,
            session: Session::new(),
            skipped: HashSet::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Fix the random source, for reproducible random discovery and delays.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    pub fn worker_id(&self) -> &str {
        self.context.worker_id()
    }

    pub fn daily_requests(&self) -> u32 {
        self.daily_requests
    }

    pub fn daily_limit_reached(&self) -> bool {
        self.daily_requests >= self.config.daily_limit
    }

    /// Pick the next task: the record's `current` task if it is still open
    /// and not leased by a live worker, otherwise the first free combination
    /// the selection policy finds. Tasks this process already gave up on are
    /// passed over. `Ok(None)` means nothing is available.
    pub async fn select_next_task(&mut self) -> Result<Option<Selection>, CoordinatorError> {
        self.refresh().await;

        let now = Utc::now();
        let timeout = self.config.lease_timeout();
        let worker_id = self.context.worker_id().to_string();

        if let Some(current) = &self.record.current {
            if self.record.is_completed(&current.key()) {
                debug!("Current task {} is already completed", current);
            } else if self.skipped.contains(&current.key()) {
                debug!("Current task {} was abandoned earlier in this process", current);
            } else if let Some(holder) =
                self.record
                    .active_lease_holder(current, now, timeout, &worker_id)
            {
                debug!("Current task {} is leased by {}", current, holder);
            } else {
                info!("Resuming task {}", current);
                return Ok(Some(Selection {
                    task: current.clone(),
                    origin: SelectionOrigin::Resumed,
                }));
            }
        }

        let record = &self.record;
        let completed = record.completed_set();
        let skipped = &self.skipped;
        let is_free = |task: &TaskKey| {
            let key = task.key();
            !completed.contains(key.as_str())
                && !skipped.contains(&key)
                && record
                    .active_lease_holder(task, now, timeout, &worker_id)
                    .is_none()
        };

        let doc_numbers = self.config.doc_numbers.range();
        let found = match self.config.selection {
            SelectionPolicy::Exhaustive => {
                discovery::exhaustive(self.options.as_ref(), doc_numbers, &is_free).await?
            }
            SelectionPolicy::Random => {
                discovery::random(
                    self.options.as_ref(),
                    doc_numbers,
                    self.config.random_probes,
                    &mut self.rng,
                    &is_free,
                )
                .await?
            }
        };

        Ok(found.map(|task| {
            info!("Discovered task {}", task);
            Selection {
                task,
                origin: SelectionOrigin::Discovered,
            }
        }))
    }

    /// Record `task` as this worker's current task and lease, then persist.
    ///
    /// Advisory: two workers can still claim the same task in the same instant.
    pub async fn claim(&mut self, task: &TaskKey) -> Result<ClaimOutcome, CoordinatorError> {
        let now = Utc::now();
        if self.record.is_completed(&task.key()) {
            return Ok(ClaimOutcome::AlreadyCompleted);
        }
        if let Some(holder) = self.record.active_lease_holder(
            task,
            now,
            self.config.lease_timeout(),
            self.context.worker_id(),
        ) {
            return Ok(ClaimOutcome::Leased {
                worker_id: holder.to_string(),
            });
        }

        self.record.current = Some(task.clone());
        self.set_lease(now, Some(task.clone()));
        self.persist().await?;
        debug!("Claimed {}", task);
        Ok(ClaimOutcome::Claimed)
    }

    /// Mark `task` completed, release it, and persist.
    pub async fn complete(&mut self, task: &TaskKey) -> Result<(), CoordinatorError> {
        self.record.mark_completed(task);
        self.release(task);
        self.daily_requests += 1;
        self.session.requests += 1;
        self.persist().await?;
        info!(
            "Successfully processed combination: {} (daily requests {}/{})",
            task, self.daily_requests, self.config.daily_limit
        );
        Ok(())
    }

    /// Give up on `task` for now. It stays uncompleted and free for any
    /// worker, but is no longer this worker's current task.
    pub async fn abandon(&mut self, task: &TaskKey) -> Result<(), CoordinatorError> {
        self.release(task);
        self.persist().await?;
        warn!("Abandoned task {}", task);
        Ok(())
    }

    /// Start a new browsing session: zero the session counters, stamp
    /// `last_run`, and persist. The process-wide daily count is untouched.
    pub async fn reset_session(&mut self) -> Result<(), CoordinatorError> {
        debug!(
            "Resetting session started at {} after {} request(s)",
            self.session.started, self.session.requests
        );
        self.session = Session::new();
        self.record.last_run = Some(self.session.started);
        self.persist().await?;
        Ok(())
    }

    /// Process tasks until one of the stop conditions holds.
    ///
    /// Returns `Err` only for fatal problems: the portal is gone or the
    /// local progress file cannot be written.
    pub async fn run(&mut self) -> Result<RunSummary, CoordinatorError> {
        let span = self.context.span().clone();
        self.run_loop().instrument(span).await
    }

    async fn run_loop(&mut self) -> Result<RunSummary, CoordinatorError> {
        info!(
            "Starting run: daily_limit={}, max_tasks={}, selection={:?}",
            self.config.daily_limit, self.config.max_tasks_per_run, self.config.selection
        );

        let mut processed = 0;
        let mut failed = 0;
        let mut attempts = 0;
        let mut documents = 0u64;

        let stop = loop {
            if self.daily_limit_reached() {
                info!("Daily limit reached. Stopping.");
                break StopReason::DailyLimitReached;
            }
            if processed >= self.config.max_tasks_per_run {
                break StopReason::RunQuotaReached;
            }
            if attempts >= self.config.max_attempts {
                warn!("Used all {} attempts for this run", self.config.max_attempts);
                break StopReason::AttemptsExhausted;
            }
            attempts += 1;

            let selection = match self.select_next_task().await {
                Ok(Some(selection)) => selection,
                Ok(None) => {
                    info!("No available task: every combination is completed or leased");
                    break StopReason::NoTaskAvailable;
                }
                Err(CoordinatorError::Discovery(e)) => {
                    warn!("Discovery failed, will try again: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.claim(&selection.task).await? {
                ClaimOutcome::Claimed => {}
                other => {
                    debug!("Could not claim {}: {:?}", selection.task, other);
                    continue;
                }
            }

            match self.attempt(&selection.task).await? {
                Some(outcome) => {
                    processed += 1;
                    documents += u64::from(outcome.documents);
                    if processed < self.config.max_tasks_per_run && !self.daily_limit_reached() {
                        self.pause().await;
                    }
                }
                None => failed += 1,
            }
        };

        self.record.last_run = Some(Utc::now());
        self.persist().await?;

        let summary = RunSummary {
            processed,
            failed,
            attempts,
            documents,
            stop,
        };
        info!(
            "Run finished: processed={}, failed={}, attempts={}, documents={}, stop={:?}",
            summary.processed, summary.failed, summary.attempts, summary.documents, summary.stop
        );
        Ok(summary)
    }

    /// Process a claimed task, retrying once after a session reset.
    /// `Ok(None)` means the task was abandoned.
    async fn attempt(&mut self, task: &TaskKey) -> Result<Option<TaskOutcome>, CoordinatorError> {
        for try_number in 1..=2 {
            match self.runner.process(task).await {
                Ok(outcome) => {
                    self.complete(task).await?;
                    return Ok(Some(outcome));
                }
                Err(ProcessError::Unavailable(reason)) => {
                    if let Err(e) = self.abandon(task).await {
                        warn!("Could not release {} before stopping: {}", task, e);
                    }
                    return Err(CoordinatorError::CollaboratorUnavailable(reason));
                }
                Err(e) if try_number == 1 => {
                    warn!("Processing {} failed: {}. Retrying once.", task, e);
                    self.reset_session().await?;
                }
                Err(e) => {
                    warn!("Processing {} failed again: {}. Skipping it.", task, e);
                }
            }
        }

        self.skipped.insert(task.key());
        self.abandon(task).await?;
        Ok(None)
    }

    async fn pause(&mut self) {
        let [min, max] = self.config.delay_secs;
        if max <= 0.0 {
            return;
        }
        let secs = if max > min {
            self.rng.gen_range(min..=max)
        } else {
            max
        };
        info!("Waiting {:.2} seconds before next request...", secs);
        tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await;
    }

    /// Fold in other workers' progress before choosing.
    async fn refresh(&mut self) {
        match self.context.store().load().await {
            Ok(fresh) => self.record = merge(&self.record, &fresh, Authority::Local),
            Err(e) => warn!("Could not refresh progress, using in-memory copy: {}", e),
        }
    }

    fn release(&mut self, task: &TaskKey) {
        if self.record.current.as_ref() == Some(task) {
            self.record.current = None;
        }
        self.set_lease(Utc::now(), None);
    }

    fn set_lease(&mut self, now: DateTime<Utc>, task: Option<TaskKey>) {
        self.record.worker_leases.insert(
            self.context.worker_id().to_string(),
            WorkerLease::new(now, task),
        );
    }

    async fn persist(&mut self) -> Result<SaveReport, CoordinatorError> {
        let report = self.context.store().save(&self.record).await?;
        self.record = report.merged.clone();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::StaticCatalog;
    use crate::progress::ProgressStore;
    use crate::testing::{fixtures, MockTaskRunner};
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn coordinator(
        dir: &TempDir,
        record: ProgressRecord,
        runner: Arc<MockTaskRunner>,
    ) -> TaskCoordinator {
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let context = WorkerContext::new("w-test", store);
        TaskCoordinator::from_record(
            context,
            fixtures::fast_config(),
            Arc::new(fixtures::catalog()),
            runner,
            record,
        )
        .with_rng_seed(42)
    }

    fn hadapsar(doc_number: u32) -> TaskKey {
        fixtures::task("2024", "Pune", "Haveli", "Hadapsar", doc_number)
    }

    #[tokio::test]
    async fn test_resume_prefers_current() {
        let dir = TempDir::new().unwrap();
        let mut record = ProgressRecord::default();
        record.current = Some(hadapsar(3));

        let mut coordinator = coordinator(&dir, record, Arc::new(MockTaskRunner::new()));
        let selection = coordinator.select_next_task().await.unwrap().unwrap();
        assert_eq!(selection.task, hadapsar(3));
        assert_eq!(selection.origin, SelectionOrigin::Resumed);
    }

    #[tokio::test]
    async fn test_completed_current_falls_through_to_discovery() {
        let dir = TempDir::new().unwrap();
        let mut record = ProgressRecord::with_completed(["2024_Pune_Haveli_Hadapsar_3"]);
        record.current = Some(hadapsar(3));

        let mut coordinator = coordinator(&dir, record, Arc::new(MockTaskRunner::new()));
        let selection = coordinator.select_next_task().await.unwrap().unwrap();
        assert_eq!(selection.origin, SelectionOrigin::Discovered);
        assert_ne!(selection.task, hadapsar(3));
    }

    #[tokio::test]
    async fn test_current_leased_by_live_worker_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut record = ProgressRecord::default();
        record.current = Some(hadapsar(3));
        record.worker_leases.insert(
            "w-other".to_string(),
            WorkerLease::new(Utc::now() - TimeDelta::minutes(10), Some(hadapsar(3))),
        );

        let mut coordinator = coordinator(&dir, record, Arc::new(MockTaskRunner::new()));
        let selection = coordinator.select_next_task().await.unwrap().unwrap();
        assert_eq!(selection.origin, SelectionOrigin::Discovered);
        assert_ne!(selection.task, hadapsar(3));

        assert_eq!(
            coordinator.claim(&hadapsar(3)).await.unwrap(),
            ClaimOutcome::Leased {
                worker_id: "w-other".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_stale_lease_does_not_block_claim() {
        let dir = TempDir::new().unwrap();
        let mut record = ProgressRecord::default();
        record.worker_leases.insert(
            "w1".to_string(),
            WorkerLease::new(Utc::now() - TimeDelta::minutes(35), Some(hadapsar(3))),
        );

        let mut coordinator = coordinator(&dir, record, Arc::new(MockTaskRunner::new()));
        assert_eq!(
            coordinator.claim(&hadapsar(3)).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(coordinator.record().current, Some(hadapsar(3)));
        assert_eq!(
            coordinator.record().worker_leases["w-test"].current_task,
            Some(hadapsar(3))
        );
    }

    #[tokio::test]
    async fn test_failed_task_retried_once_then_abandoned() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(MockTaskRunner::new());
        runner.fail_task(&hadapsar(0), 2).await;

        let mut coordinator = coordinator(&dir, ProgressRecord::default(), runner.clone());
        coordinator.claim(&hadapsar(0)).await.unwrap();
        let outcome = coordinator.attempt(&hadapsar(0)).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(runner.attempt_count().await, 2);
        assert!(!coordinator.record().is_completed(&hadapsar(0).key()));
        assert_eq!(coordinator.record().current, None);
        assert_eq!(coordinator.record().worker_leases["w-test"].current_task, None);
        assert!(coordinator.record().last_run.is_some());
    }

    #[tokio::test]
    async fn test_unavailable_runner_is_fatal() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(MockTaskRunner::new());
        runner.set_unavailable().await;

        let mut coordinator = coordinator(&dir, ProgressRecord::default(), runner);
        let err = coordinator.run().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::CollaboratorUnavailable(_)));
        assert_eq!(coordinator.record().current, None);
    }

    #[tokio::test]
    async fn test_run_stops_at_daily_limit() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(MockTaskRunner::new());
        let mut coordinator = coordinator(&dir, ProgressRecord::default(), runner.clone());

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.stop, StopReason::DailyLimitReached);
        assert_eq!(summary.processed, fixtures::fast_config().daily_limit);
        assert_eq!(coordinator.record().completed().len(), summary.processed as usize);

        // in exhaustive order: doc numbers ascending in the first village
        assert_eq!(runner.attempts().await[0].key(), "2023_Pune_Haveli_Hadapsar_0");
    }

    #[tokio::test]
    async fn test_run_ends_when_everything_is_done() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"));
        let catalog = StaticCatalog::from_json(r#"{ "2024": { "Pune": { "Haveli": ["Hadapsar"] } } }"#)
            .unwrap();
        let mut config = fixtures::fast_config();
        config.doc_numbers.end = 1;
        config.daily_limit = 100;

        let mut coordinator = TaskCoordinator::from_record(
            WorkerContext::new("w-test", store),
            config,
            Arc::new(catalog),
            Arc::new(MockTaskRunner::new()),
            ProgressRecord::default(),
        );

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.stop, StopReason::NoTaskAvailable);
    }
}
