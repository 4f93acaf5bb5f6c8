use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::coordinator::CoordinatorConfig;
use crate::portal::PortalConfig;
use crate::remote::{RemoteBackendKind, RemoteConfig};

/// Root configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub portal: PortalConfig,
}

/// Where progress is kept
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProgressConfig {
    /// Local progress file.
    #[serde(default = "default_progress_path")]
    pub path: PathBuf,
    /// Object key / repository path of the remote copy.
    #[serde(default = "default_remote_key")]
    pub remote_key: String,
    /// Fixed worker identity. A random one is generated per process when unset.
    #[serde(default)]
    pub worker_id: Option<String>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            path: default_progress_path(),
            remote_key: default_remote_key(),
            worker_id: None,
        }
    }
}

fn default_progress_path() -> PathBuf {
    PathBuf::from("progress.json")
}

fn default_remote_key() -> String {
    "progress.json".to_string()
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub progress: ProgressConfig,
    pub remote: SanitizedRemoteConfig,
    pub coordinator: CoordinatorConfig,
    pub portal: PortalConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRemoteConfig {
    pub enabled: bool,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<SanitizedS3Config>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<SanitizedGitHubConfig>,
}

/// Sanitized S3 config (keys hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedS3Config {
    pub bucket: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    pub static_credentials: bool,
}

/// Sanitized GitHub config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedGitHubConfig {
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub api_url: String,
    pub token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let remote = &config.remote;
        Self {
            progress: config.progress.clone(),
            remote: SanitizedRemoteConfig {
                enabled: remote.enabled,
                backend: match remote.backend {
                    RemoteBackendKind::S3 => "s3".to_string(),
                    RemoteBackendKind::GitHub => "github".to_string(),
                },
                s3: remote.s3.as_ref().map(|s3| SanitizedS3Config {
                    bucket: s3.bucket.clone(),
                    region: s3.region.clone(),
                    endpoint_url: s3.endpoint_url.clone(),
                    static_credentials: s3.access_key_id.is_some()
                        && s3.secret_access_key.is_some(),
                }),
                github: remote.github.as_ref().map(|gh| SanitizedGitHubConfig {
                    repository: gh.repository.clone(),
                    branch: gh.branch.clone(),
                    api_url: gh.api_url.clone(),
                    token_configured: !gh.token.is_empty(),
                }),
            },
            coordinator: config.coordinator.clone(),
            portal: config.portal.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SelectionPolicy;
    use crate::remote::{GitHubConfig, S3Config};

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.progress.path, PathBuf::from("progress.json"));
        assert_eq!(config.progress.remote_key, "progress.json");
        assert!(config.progress.worker_id.is_none());
        assert!(!config.remote.enabled);
        assert_eq!(config.coordinator.daily_limit, 5);
        assert!(config.portal.driver.is_none());
    }

    #[test]
    fn test_deserialize_full_config() {
        let json = r#"{
            "progress": { "path": "/var/lib/igr/progress.json", "worker_id": "vm-3" },
            "remote": {
                "enabled": true,
                "backend": "s3",
                "s3": { "bucket": "igr-progress", "region": "ap-south-1" }
            },
            "coordinator": { "daily_limit": 8, "delay_secs": [2, 4], "selection": "random" },
            "portal": {
                "driver": { "program": "python3", "args": ["driver.py"] },
                "catalog": "catalog.json"
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.progress.worker_id.as_deref(), Some("vm-3"));
        assert_eq!(config.remote.backend, RemoteBackendKind::S3);
        assert_eq!(config.remote.s3.as_ref().unwrap().region, "ap-south-1");
        assert_eq!(config.coordinator.daily_limit, 8);
        assert_eq!(config.coordinator.selection, SelectionPolicy::Random);
        assert_eq!(config.portal.driver.as_ref().unwrap().args, ["driver.py"]);
        assert_eq!(config.portal.catalog, Some(PathBuf::from("catalog.json")));
    }

    #[test]
    fn test_deserialize_toml_config() {
        let toml = r#"
[progress]
path = "state/progress.json"

[remote]
enabled = true
backend = "github"

[remote.github]
repository = "acme/igr-progress"
token = "ghp_secret"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.remote.backend, RemoteBackendKind::GitHub);
        assert_eq!(
            config.remote.github.as_ref().unwrap().repository,
            "acme/igr-progress"
        );
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config = Config::default();
        config.remote.enabled = true;
        config.remote.s3 = Some(S3Config {
            bucket: "igr".to_string(),
            region: "us-east-1".to_string(),
            access_key_id: Some("AKIAEXAMPLE".to_string()),
            secret_access_key: Some("very-secret".to_string()),
            endpoint_url: None,
            force_path_style: None,
        });
        config.remote.github = Some(GitHubConfig {
            repository: "acme/igr".to_string(),
            token: "ghp_secret".to_string(),
            branch: None,
            api_url: "https://api.github.com".to_string(),
            commit_message: "Update progress file".to_string(),
            timeout_secs: 30,
        });

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.remote.s3.as_ref().unwrap().static_credentials);
        assert!(sanitized.remote.github.as_ref().unwrap().token_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("very-secret"));
        assert!(!json.contains("AKIAEXAMPLE"));
        assert!(!json.contains("ghp_secret"));
    }
}
