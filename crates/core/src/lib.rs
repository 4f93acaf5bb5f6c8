pub mod config;
pub mod coordinator;
pub mod portal;
pub mod progress;
pub mod remote;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, ProgressConfig,
    SanitizedConfig,
};
pub use coordinator::{
    ClaimOutcome, CoordinatorConfig, CoordinatorError, RunSummary, SelectionPolicy, StopReason,
    TaskCoordinator, WorkerContext,
};
pub use portal::{
    CommandSession, OptionSource, PortalConfig, PortalError, PortalSession, PortalTaskRunner,
    ProcessError, SessionOptionSource, StaticCatalog, TaskRunner,
};
pub use progress::{
    ProgressError, ProgressRecord, ProgressStore, ProgressSummary, RemoteSync, TaskKey,
};
pub use remote::{create_remote_backend, RemoteBackend, RemoteConfig, RemoteError};
