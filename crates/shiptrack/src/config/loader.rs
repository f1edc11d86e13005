use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variable that overrides the default config location.
pub const CONFIG_ENV_VAR: &str = "SHIPTRACK_CONFIG";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Returns `$SHIPTRACK_CONFIG`, else `~/.shiptrack/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|h| h.join(".shiptrack").join("config.json"))
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks that span several fields. Ranges and formats are in the schema.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.telegram.enabled {
        if config.telegram.chat_id.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Validation {
                message: "telegram.chat_id is required when telegram is enabled".to_string(),
            });
        }
        if !config.telegram.bot_token.is_configured() {
            return Err(ConfigError::Validation {
                message: "telegram.bot_token is required when telegram is enabled".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{DuplicatePolicy, FailureMode, LogFormat};
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config.scheduler.interval_secs, 180);
        assert!(config.scheduler.enabled);
        assert_eq!(config.refresh.timeout_secs, 15);
        assert!(config.refresh.concurrency >= 2 && config.refresh.concurrency <= 4);
        assert_eq!(config.carriers.ghn.mode, FailureMode::Fallback);
        assert_eq!(config.database.duplicate_policy, DuplicatePolicy::Ignore);
        assert!(config.database.record_history);
        assert!(!config.telegram.enabled);
        assert_eq!(config.carriers.vtp.token.env.as_deref(), Some("VTP_TOKEN"));
    }

    #[test]
    fn test_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database": { "path": "/tmp/st.db", "record_history": false, "duplicate_policy": "reject" },
            "refresh": { "concurrency": 2, "timeout_secs": 10 },
            "scheduler": { "enabled": false, "interval_secs": 60 },
            "carriers": {
                "ghn": { "mode": "strict" },
                "vtp": { "endpoint": "https://vtp.example/track", "token": { "value": "t" } }
            },
            "telegram": { "enabled": true, "chat_id": "42", "bot_token": { "value": "abc" } },
            "session": { "credential_ttl_secs": 3600 },
            "logging": { "format": "json", "filter": "shiptrack=debug" }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.database.duplicate_policy, DuplicatePolicy::Reject);
        assert!(!config.database.record_history);
        assert_eq!(config.refresh.concurrency, 2);
        assert_eq!(config.carriers.ghn.mode, FailureMode::Strict);
        assert_eq!(config.carriers.vtp.token.value.as_deref(), Some("t"));
        assert_eq!(config.session.credential_ttl_secs, Some(3600));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_embedded_schema_compiles() {
        let schema: serde_json::Value = serde_json::from_str(SCHEMA_JSON).unwrap();
        assert!(jsonschema::validator_for(&schema).is_ok());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = load_config_from_str(r#"{ "version": "2.0" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_rejects_out_of_range_numbers() {
        for config_json in [
            r#"{ "version": "1.0", "refresh": { "concurrency": 0 } }"#,
            r#"{ "version": "1.0", "refresh": { "concurrency": 33 } }"#,
            r#"{ "version": "1.0", "refresh": { "timeout_secs": 600 } }"#,
            r#"{ "version": "1.0", "scheduler": { "interval_secs": 1 } }"#,
        ] {
            let err = load_config_from_str(config_json).unwrap_err();
            assert!(
                matches!(err, ConfigError::SchemaValidation { .. }),
                "{}: {}",
                config_json,
                err
            );
        }
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let err = load_config_from_str(
            r#"{ "version": "1.0", "refresh": { "concurency": 2 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
        assert!(err.to_string().contains("concurency"));
    }

    #[test]
    fn test_collects_every_schema_error() {
        let err = load_config_from_str(
            r#"{ "version": "1.0", "refresh": { "concurrency": 0, "timeout_secs": 0 } }"#,
        )
        .unwrap_err();
        match err {
            ConfigError::SchemaValidation { errors } => assert_eq!(errors.matches("; ").count(), 1),
            other => panic!("expected a schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_telegram_requires_chat_id() {
        let err = load_config_from_str(
            r#"{ "version": "1.0", "telegram": { "enabled": true, "bot_token": { "value": "x" } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("chat_id"));
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let err = load_config_from_str(
            r#"{ "version": "1.0", "carriers": { "spx": { "endpoint": "ftp://x" } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
        assert!(err.to_string().contains("ftp://x"));
    }

    #[test]
    fn test_rejects_unknown_ghn_mode() {
        let err = load_config_from_str(
            r#"{ "version": "1.0", "carriers": { "ghn": { "mode": "sometimes" } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::SchemaValidation { .. }));
    }

    #[test]
    fn test_telegram_requires_configured_token() {
        let err = load_config_from_str(
            r#"{ "version": "1.0", "telegram": { "enabled": true, "chat_id": "42", "bot_token": {} } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        assert!(err.to_string().contains("telegram.bot_token"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "version": "1.0" }}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.version, "1.0");

        let missing = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(missing, ConfigError::ReadFile { .. }));
    }
}
