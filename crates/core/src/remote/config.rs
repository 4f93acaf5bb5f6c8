//! Remote mirror configuration.

use serde::{Deserialize, Serialize};

/// Remote mirror settings. Disabled by default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub backend: RemoteBackendKind,
    /// Required when `backend = "s3"`.
    #[serde(default)]
    pub s3: Option<S3Config>,
    /// Required when `backend = "github"`.
    #[serde(default)]
    pub github: Option<GitHubConfig>,
}

/// Available remote backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemoteBackendKind {
    #[default]
    S3,
    #[serde(rename = "github")]
    GitHub,
}

impl std::fmt::Display for RemoteBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteBackendKind::S3 => write!(f, "s3"),
            RemoteBackendKind::GitHub => write!(f, "github"),
        }
    }
}

/// S3 bucket holding the progress object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Static credentials. When absent the default AWS provider chain is used.
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Custom endpoint (MinIO, LocalStack, ...).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Defaults to true when `endpoint_url` is set.
    #[serde(default)]
    pub force_path_style: Option<bool>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// GitHub repository holding the progress file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// `owner/name`
    pub repository: String,
    pub token: String,
    /// Branch to commit to. Repository default when unset.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_commit_message() -> String {
    "Update progress file".to_string()
}

fn default_timeout() -> u32 {
    30
}
