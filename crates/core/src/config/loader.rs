use figment::{
    providers::{Env, Format, Json, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// The file is JSON unless its extension is `.toml`. Variables prefixed
/// `HARVEST_` override file values; nested keys are separated by `__`
/// (`HARVEST_COORDINATOR__DAILY_LIMIT=8`).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let figment = if is_toml {
        Figment::new().merge(Toml::file(path))
    } else {
        Figment::new().merge(Json::file(path))
    };

    let config: Config = figment
        .merge(Env::prefixed("HARVEST_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from a JSON string (useful for testing)
pub fn load_config_from_str(json: &str) -> Result<Config, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    #[test]
    fn test_load_config_from_str_valid() {
        let json = r#"{ "coordinator": { "daily_limit": 12 } }"#;
        let config = load_config_from_str(json).unwrap();
        assert_eq!(config.coordinator.daily_limit, 12);
    }

    #[test]
    fn test_load_config_from_str_wrong_type() {
        let json = r#"{ "coordinator": { "daily_limit": "many" } }"#;
        let result = load_config_from_str(json);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_json_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"{{
                "progress": {{ "path": "data/progress.json" }},
                "coordinator": {{ "delay_secs": [1, 2] }}
            }}"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.progress.path.to_str().unwrap(), "data/progress.json");
        assert_eq!(config.coordinator.delay_secs, [1.0, 2.0]);
    }

    #[test]
    fn test_load_config_from_toml_file() {
        let mut temp_file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            temp_file,
            r#"
[coordinator]
lease_timeout_minutes = 45
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.coordinator.lease_timeout_minutes, 45);
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config.example.json");
        let config = load_config(&path).unwrap();
        assert!(crate::config::validate_config(&config).is_ok());
        assert_eq!(config.portal.captcha_attempts, 2);
    }

    #[test]
    fn test_env_overrides_nested_key() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"{{ "progress": {{ "worker_id": "from-file" }} }}"#).unwrap();

        std::env::set_var("HARVEST_PROGRESS__WORKER_ID", "from-env");
        let config = load_config(temp_file.path());
        std::env::remove_var("HARVEST_PROGRESS__WORKER_ID");

        assert_eq!(config.unwrap().progress.worker_id.as_deref(), Some("from-env"));
    }
}
