//! Collaborators that talk to the registration search portal.
//!
//! Browser automation itself lives outside this crate, in a helper process
//! driven by [`CommandSession`]. This module defines the surface the
//! coordinator consumes: a [`PortalSession`] for form interaction, an
//! [`OptionSource`] for the cascading dropdowns, and a [`TaskRunner`] that
//! processes one task.

mod catalog;
mod command;
mod config;
mod error;
mod runner;
mod traits;
mod types;

pub use catalog::StaticCatalog;
pub use command::CommandSession;
pub use config::{DriverConfig, PortalConfig};
pub use error::{PortalError, ProcessError};
pub use runner::{PortalTaskRunner, SessionOptionSource};
pub use traits::{OptionSource, PortalSession, TaskRunner};
pub use types::{dropdown_path, DropdownLevel, ProcessStep, TaskOutcome};
