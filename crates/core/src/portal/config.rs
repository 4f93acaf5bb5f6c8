//! Portal configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Portal collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Automation helper process. Required for `run`.
    #[serde(default)]
    pub driver: Option<DriverConfig>,

    /// Static option catalog used for discovery instead of reading the
    /// dropdowns through the driver.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// CAPTCHA attempts per task before the task fails.
    #[serde(default = "default_captcha_attempts")]
    pub captcha_attempts: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            driver: None,
            catalog: None,
            captcha_attempts: default_captcha_attempts(),
        }
    }
}

/// External automation helper speaking line-delimited JSON on stdin/stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Program to spawn.
    pub program: PathBuf,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for a single request in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_captcha_attempts() -> u32 {
    2
}

fn default_timeout() -> u64 {
    120
}
