//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the portal, the task runner and the shared remote
//! store, so coordination can be exercised end to end without a browser
//! or network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use harvest_core::testing::{fixtures, MockRemoteBackend, MockTaskRunner};
//!
//! let remote = Arc::new(MockRemoteBackend::new());
//! let runner = Arc::new(MockTaskRunner::new());
//! runner.fail_task(&fixtures::task("2024", "Pune", "Haveli", "Hadapsar", 0), 1).await;
//!
//! let store = ProgressStore::new(dir.join("progress.json"))
//!     .with_remote(remote.clone(), "progress.json");
//! ```

mod mock_portal;
mod mock_remote;
mod mock_runner;

pub use mock_portal::MockPortal;
pub use mock_remote::MockRemoteBackend;
pub use mock_runner::MockTaskRunner;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{TimeDelta, Utc};

    use crate::coordinator::CoordinatorConfig;
    use crate::portal::StaticCatalog;
    use crate::progress::{ProgressRecord, TaskKey, WorkerLease};

    const CATALOG: &str = r#"{
        "2024": {
            "Pune": { "Haveli": ["Hadapsar", "Wagholi"], "Mulshi": ["Paud"] },
            "Thane": { "Bhiwandi": ["Kalher"] }
        },
        "2023": { "Pune": { "Haveli": ["Hadapsar"] } }
    }"#;

    /// Small option tree: two years, two districts, five villages.
    pub fn catalog() -> StaticCatalog {
        StaticCatalog::from_json(CATALOG).expect("fixture catalog is valid")
    }

    /// Build a task key, panicking on names that cannot form one.
    pub fn task(year: &str, district: &str, taluka: &str, village: &str, doc_number: u32) -> TaskKey {
        TaskKey::new(year, district, taluka, village, doc_number).expect("fixture task key is valid")
    }

    /// Coordinator settings with no pauses and a small daily limit.
    pub fn fast_config() -> CoordinatorConfig {
        CoordinatorConfig {
            daily_limit: 3,
            delay_secs: [0.0, 0.0],
            ..CoordinatorConfig::default()
        }
    }

    /// A record where `worker_id` last checked in `minutes_ago` minutes ago
    /// while holding `task`.
    pub fn record_with_lease(worker_id: &str, minutes_ago: i64, task: Option<TaskKey>) -> ProgressRecord {
        let mut record = ProgressRecord::default();
        record.worker_leases.insert(
            worker_id.to_string(),
            WorkerLease::new(Utc::now() - TimeDelta::minutes(minutes_ago), task),
        );
        record
    }
}
