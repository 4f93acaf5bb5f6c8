use super::{types::Config, ConfigError};
use crate::coordinator::SelectionPolicy;
use crate::remote::RemoteBackendKind;

/// Validate configuration
/// Currently validates:
/// - Progress path is not empty
/// - Daily limit, lease timeout, write attempts and run limits are non-zero
/// - Delay range is finite, non-negative and ordered
/// - Doc-number range is ordered
/// - An enabled remote has its backend section with identifiers filled in
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    // Progress validation
    if config.progress.path.as_os_str().is_empty() {
        return fail("progress.path cannot be empty");
    }
    if config.progress.remote_key.trim().is_empty() {
        return fail("progress.remote_key cannot be empty");
    }

    // Coordinator validation
    let coordinator = &config.coordinator;
    if coordinator.daily_limit == 0 {
        return fail("coordinator.daily_limit cannot be 0");
    }
    let [min, max] = coordinator.delay_secs;
    if !min.is_finite() || !max.is_finite() || min < 0.0 || max < 0.0 {
        return fail("coordinator.delay_secs must be non-negative numbers");
    }
    if min > max {
        return fail("coordinator.delay_secs must be [min, max] with min <= max");
    }
    if coordinator.lease_timeout_minutes == 0 {
        return fail("coordinator.lease_timeout_minutes cannot be 0");
    }
    if coordinator.doc_numbers.start > coordinator.doc_numbers.end {
        return fail("coordinator.doc_numbers.start must not exceed end");
    }
    if coordinator.max_write_attempts == 0 {
        return fail("coordinator.max_write_attempts cannot be 0");
    }
    if coordinator.max_tasks_per_run == 0 || coordinator.max_attempts == 0 {
        return fail("coordinator.max_tasks_per_run and max_attempts cannot be 0");
    }
    if coordinator.selection == SelectionPolicy::Random && coordinator.random_probes == 0 {
        return fail("coordinator.random_probes cannot be 0 with random selection");
    }

    // Remote validation
    let remote = &config.remote;
    if remote.enabled {
        match remote.backend {
            RemoteBackendKind::S3 => match &remote.s3 {
                None => return fail("remote.s3 section is required when backend = \"s3\""),
                Some(s3) if s3.bucket.trim().is_empty() => {
                    return fail("remote.s3.bucket cannot be empty")
                }
                Some(_) => {}
            },
            RemoteBackendKind::GitHub => match &remote.github {
                None => {
                    return fail("remote.github section is required when backend = \"github\"")
                }
                Some(gh) if gh.repository.trim().is_empty() => {
                    return fail("remote.github.repository cannot be empty")
                }
                Some(gh) if gh.token.trim().is_empty() => {
                    return fail("remote.github.token cannot be empty")
                }
                Some(_) => {}
            },
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{GitHubConfig, RemoteConfig};
    use std::path::PathBuf;

    fn assert_invalid(config: &Config) {
        let result = validate_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_coordinator_limits() {
        let mut config = Config::default();
        config.coordinator.daily_limit = 0;
        assert_invalid(&config);

        let mut config = Config::default();
        config.coordinator.delay_secs = [7.0, 3.0];
        assert_invalid(&config);

        let mut config = Config::default();
        config.coordinator.delay_secs = [-1.0, 3.0];
        assert_invalid(&config);

        let mut config = Config::default();
        config.coordinator.lease_timeout_minutes = 0;
        assert_invalid(&config);

        let mut config = Config::default();
        config.coordinator.doc_numbers.start = 10;
        config.coordinator.doc_numbers.end = 2;
        assert_invalid(&config);

        let mut config = Config::default();
        config.coordinator.max_write_attempts = 0;
        assert_invalid(&config);

        let mut config = Config::default();
        config.coordinator.selection = SelectionPolicy::Random;
        config.coordinator.random_probes = 0;
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_empty_progress_path_fails() {
        let mut config = Config::default();
        config.progress.path = PathBuf::new();
        assert_invalid(&config);
    }

    #[test]
    fn test_validate_enabled_remote_needs_backend_section() {
        let mut config = Config::default();
        config.remote = RemoteConfig {
            enabled: true,
            backend: RemoteBackendKind::GitHub,
            s3: None,
            github: None,
        };
        assert_invalid(&config);

        config.remote.github = Some(GitHubConfig {
            repository: "acme/igr".to_string(),
            token: "  ".to_string(),
            branch: None,
            api_url: "https://api.github.com".to_string(),
            commit_message: "Update progress file".to_string(),
            timeout_secs: 30,
        });
        assert_invalid(&config);

        if let Some(github) = config.remote.github.as_mut() {
            github.token = "ghp_x".to_string();
        }
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_disabled_remote_ignores_sections() {
        let mut config = Config::default();
        config.remote.backend = RemoteBackendKind::S3;
        assert!(validate_config(&config).is_ok());
    }
}
