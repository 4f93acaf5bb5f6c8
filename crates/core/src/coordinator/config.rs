//! Coordinator configuration.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

/// How the next task is discovered when there is nothing to resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Walk the option tree in order and take the first free combination.
    #[default]
    Exhaustive,
    /// Pick uniformly at every level, up to `random_probes` times. Finds work
    /// quickly on a mostly empty record but cannot prove exhaustion.
    Random,
}

/// Document numbers tried for every village, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocNumberRange {
    #[serde(default)]
    pub start: u32,
    #[serde(default = "default_doc_end")]
    pub end: u32,
}

impl Default for DocNumberRange {
    fn default() -> Self {
        Self {
            start: 0,
            end: default_doc_end(),
        }
    }
}

impl DocNumberRange {
    pub fn range(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

fn default_doc_end() -> u32 {
    9
}

/// Worker loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Tasks a process completes before it stops for good.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Pause after each completed task, `[min, max]` seconds.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: [f64; 2],

    /// A lease older than this no longer blocks other workers.
    #[serde(default = "default_lease_timeout_minutes")]
    pub lease_timeout_minutes: u64,

    #[serde(default)]
    pub selection: SelectionPolicy,

    /// Tasks to complete in one `run`.
    #[serde(default = "default_max_tasks_per_run")]
    pub max_tasks_per_run: u32,

    /// Loop iterations in one `run`, successful or not.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub doc_numbers: DocNumberRange,

    /// Remote write attempts per save when the remote keeps changing.
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,

    /// Combinations tried per discovery under [`SelectionPolicy::Random`].
    #[serde(default = "default_random_probes")]
    pub random_probes: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            delay_secs: default_delay_secs(),
            lease_timeout_minutes: default_lease_timeout_minutes(),
            selection: SelectionPolicy::default(),
            max_tasks_per_run: default_max_tasks_per_run(),
            max_attempts: default_max_attempts(),
            doc_numbers: DocNumberRange::default(),
            max_write_attempts: default_max_write_attempts(),
            random_probes: default_random_probes(),
        }
    }
}

impl CoordinatorConfig {
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_minutes.saturating_mul(60))
    }
}

fn default_daily_limit() -> u32 {
    5
}

fn default_delay_secs() -> [f64; 2] {
    [3.0, 7.0]
}

fn default_lease_timeout_minutes() -> u64 {
    30
}

fn default_max_tasks_per_run() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    20
}

fn default_max_write_attempts() -> u32 {
    3
}

fn default_random_probes() -> u32 {
    50
}
