//! Progress record types.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::error::TaskKeyError;
use super::wire;

/// Separator used to join the five task components into one key string.
pub const TASK_KEY_DELIMITER: char = '_';

/// One unit of work: a single search on the portal.
///
/// Two tasks are the same task iff all five components are equal. Components
/// are validated on construction so the joined key always parses back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    year: String,
    district: String,
    taluka: String,
    village: String,
    doc_number: u32,
}

impl TaskKey {
    /// Build a task key, trimming components and rejecting empty ones or
    /// ones containing [`TASK_KEY_DELIMITER`].
    pub fn new(
        year: impl Into<String>,
        district: impl Into<String>,
        taluka: impl Into<String>,
        village: impl Into<String>,
        doc_number: u32,
    ) -> Result<Self, TaskKeyError> {
        Ok(Self {
            year: component("year", year.into())?,
            district: component("district", district.into())?,
            taluka: component("taluka", taluka.into())?,
            village: component("village", village.into())?,
            doc_number,
        })
    }

    pub fn year(&self) -> &str {
        &self.year
    }

    pub fn district(&self) -> &str {
        &self.district
    }

    pub fn taluka(&self) -> &str {
        &self.taluka
    }

    pub fn village(&self) -> &str {
        &self.village
    }

    pub fn doc_number(&self) -> u32 {
        self.doc_number
    }

    /// The joined key string as stored in `completed`.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

fn component(field: &'static str, value: String) -> Result<String, TaskKeyError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TaskKeyError::EmptyComponent { field });
    }
    if value.contains(TASK_KEY_DELIMITER) {
        return Err(TaskKeyError::DelimiterInComponent {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.to_string())
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = TASK_KEY_DELIMITER;
        write!(
            f,
            "{}{d}{}{d}{}{d}{}{d}{}",
            self.year, self.district, self.taluka, self.village, self.doc_number
        )
    }
}

impl FromStr for TaskKey {
    type Err = TaskKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(TASK_KEY_DELIMITER).collect();
        let [year, district, taluka, village, doc] = parts.as_slice() else {
            return Err(TaskKeyError::Malformed(s.to_string()));
        };
        let doc_number = doc
            .parse::<u32>()
            .map_err(|_| TaskKeyError::Malformed(s.to_string()))?;
        Self::new(*year, *district, *taluka, *village, doc_number)
    }
}

/// A worker's advisory claim, refreshed whenever that worker saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLease {
    #[serde(with = "wire::timestamp")]
    pub last_active: DateTime<Utc>,
    #[serde(default, with = "wire::task_fields")]
    pub current_task: Option<TaskKey>,
}

impl WorkerLease {
    pub fn new(last_active: DateTime<Utc>, current_task: Option<TaskKey>) -> Self {
        Self {
            last_active,
            current_task,
        }
    }

    /// A lease is stale once `now - last_active` exceeds the timeout.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        now.signed_duration_since(self.last_active) > timeout
    }

    /// Whether this lease currently prevents others from claiming `task`.
    pub fn blocks(&self, task: &TaskKey, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.current_task.as_ref() == Some(task) && !self.is_stale(now, timeout)
    }
}

/// The persisted progress document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// End of the most recent completed session.
    #[serde(default, with = "wire::timestamp::option")]
    pub last_run: Option<DateTime<Utc>>,

    /// Completed task keys, unique, in the order they were first recorded.
    #[serde(default, deserialize_with = "wire::dedup_completed")]
    completed: Vec<String>,

    /// Task the last saving worker was processing.
    #[serde(default, with = "wire::task_fields")]
    pub current: Option<TaskKey>,

    /// Per-worker leases, keyed by worker id. `vm_tasks` is the older name.
    #[serde(
        default,
        alias = "vm_tasks",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub worker_leases: BTreeMap<String, WorkerLease>,
}

impl ProgressRecord {
    /// Record with the given completed keys (duplicates dropped).
    pub fn with_completed<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let completed = keys
            .into_iter()
            .map(Into::into)
            .filter(|key: &String| seen.insert(key.clone()))
            .collect();
        Self {
            completed,
            ..Self::default()
        }
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.completed.iter().any(|k| k == key)
    }

    /// Snapshot of completed keys for repeated membership checks.
    pub fn completed_set(&self) -> HashSet<&str> {
        self.completed.iter().map(String::as_str).collect()
    }

    /// Record `task` as completed. Returns false if it already was.
    pub fn mark_completed(&mut self, task: &TaskKey) -> bool {
        self.push_completed(task.key())
    }

    fn push_completed(&mut self, key: String) -> bool {
        if self.is_completed(&key) {
            return false;
        }
        self.completed.push(key);
        true
    }

    /// Worker (other than `except`) holding a live lease on `task`, if any.
    pub fn active_lease_holder(
        &self,
        task: &TaskKey,
        now: DateTime<Utc>,
        timeout: Duration,
        except: &str,
    ) -> Option<&str> {
        self.worker_leases
            .iter()
            .find(|(worker, lease)| worker.as_str() != except && lease.blocks(task, now, timeout))
            .map(|(worker, _)| worker.as_str())
    }

    /// Human-oriented overview of the record.
    pub fn summary(&self, now: DateTime<Utc>, lease_timeout: Duration) -> ProgressSummary {
        let mut active_leases = Vec::new();
        let mut stale_leases = 0;
        for (worker_id, lease) in &self.worker_leases {
            if lease.is_stale(now, lease_timeout) {
                stale_leases += 1;
            } else {
                active_leases.push(LeaseSummary {
                    worker_id: worker_id.clone(),
                    current_task: lease.current_task.as_ref().map(TaskKey::key),
                    last_active: lease.last_active,
                });
            }
        }

        ProgressSummary {
            last_run: self.last_run,
            completed: self.completed.len(),
            current: self.current.as_ref().map(TaskKey::key),
            active_leases,
            stale_leases,
        }
    }
}

/// Overview produced by [`ProgressRecord::summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSummary {
    pub last_run: Option<DateTime<Utc>>,
    pub completed: usize,
    pub current: Option<String>,
    pub active_leases: Vec<LeaseSummary>,
    pub stale_leases: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseSummary {
    pub worker_id: String,
    pub current_task: Option<String>,
    pub last_active: DateTime<Utc>,
}
