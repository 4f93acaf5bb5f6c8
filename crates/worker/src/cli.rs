//! Command-line arguments for the harvest worker.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Coordinated scraping worker for IGR property documents
#[derive(Parser, Debug, Clone)]
#[command(
    name = "igr-harvest",
    version,
    about = "Coordinated scraping worker for IGR property documents",
    after_help = "EXAMPLES:\n    \
        # Process tasks until a limit is reached\n    \
        igr-harvest --config config.json run\n\n    \
        # Show shared progress\n    \
        igr-harvest status\n\n    \
        # Clear all progress, locally and remotely\n    \
        igr-harvest reset --yes"
)]
pub struct Cli {
    /// Configuration file (JSON, or TOML with a .toml extension)
    #[arg(long, env = "HARVEST_CONFIG", default_value = "config.json", global = true)]
    pub config: PathBuf,

    /// Worker id to use instead of the configured or generated one
    #[arg(long, global = true)]
    pub worker_id: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to run; defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Claim and process tasks until a stop condition is reached
    Run,

    /// Print completed tasks and worker leases
    Status,

    /// Overwrite progress with an empty record
    Reset {
        /// Confirm that all progress should be discarded
        #[arg(long)]
        yes: bool,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }
}
