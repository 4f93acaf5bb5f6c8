//! Task coordination: deciding which combination a worker processes next
//! without duplicating work done or claimed by other workers.
//!
//! Workers share nothing but the progress document. Claims are advisory
//! leases that expire after `lease_timeout_minutes`; the `completed` list
//! only ever grows.

mod config;
mod context;
mod discovery;
mod runner;
mod types;

pub use config::{CoordinatorConfig, DocNumberRange, SelectionPolicy};
pub use context::WorkerContext;
pub use runner::TaskCoordinator;
pub use types::{
    ClaimOutcome, CoordinatorError, RunSummary, Selection, SelectionOrigin, StopReason,
};
