//! Secret resolution for carrier and notifier credentials.
//!
//! A [`SecretRef`] names where a secret lives. Sources are tried in order:
//!
//! 1. **Direct value** (`"value": "..."`), for quick local testing
//! 2. **File** (`"file": "/run/secrets/vtp_token"`), for Docker secrets
//! 3. **Environment variable** (`"env": "VTP_TOKEN"`)

use std::fs;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: value, file, or env)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

pub type Result<T> = std::result::Result<T, SecretError>;

/// Where to find one secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl SecretRef {
    pub fn from_env(name: &str) -> Self {
        Self {
            env: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        has_secret_source(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )
    }

    pub fn resolve(&self) -> Result<SecretString> {
        resolve_secret(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )
    }

    /// Like [`SecretRef::resolve`], but an unset environment variable or an
    /// empty reference yields `None` rather than an error.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NoSourceProvided) | Err(SecretError::EnvVarNotSet { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resolves a secret from the first non-empty source: direct value, file
/// contents, then environment variable.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(SecretString::from(value.to_string()));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = expand_home(path);
        return fs::read_to_string(&expanded)
            .map(|content| SecretString::from(content.trim().to_string()))
            .map_err(|source| SecretError::FileReadError {
                path: expanded,
                source,
            });
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            // env files often leave a trailing newline
            Ok(value) => Ok(SecretString::from(value.trim().to_string())),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Checks if at least one secret source is configured (non-empty).
pub fn has_secret_source(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> bool {
    direct.is_some_and(|s| !s.is_empty())
        || file_path.is_some_and(|s| !s.is_empty())
        || env_var.is_some_and(|s| !s.is_empty())
}

/// Expands a leading `~` to the user's home directory.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
