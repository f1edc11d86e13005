use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::secrets::SecretRef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub carriers: CarriersConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database: DatabaseConfig::default(),
            refresh: RefreshConfig::default(),
            scheduler: SchedulerConfig::default(),
            carriers: CarriersConfig::default(),
            telegram: TelegramConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// What `create` does when the tracking code is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Repeated adds are no-ops that return the existing shipment.
    #[default]
    Ignore,
    /// Repeated adds fail with `DuplicateTrackingCode`.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to `~/.shiptrack/data/shiptrack.db`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Append a `status_logs` row for every detected change.
    #[serde(default = "default_true")]
    pub record_history: bool,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            record_history: true,
            duplicate_policy: DuplicatePolicy::Ignore,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Maximum number of carrier calls in flight during a batch refresh.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-call deadline for a carrier fetch.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_concurrency() -> usize {
    num_cpus::get().clamp(2, 4)
}

fn default_timeout_secs() -> u64 {
    15
}

impl RefreshConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    180
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
        }
    }
}

/// How an adapter reacts when its carrier cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Every failure surfaces as `CarrierUnavailable`.
    #[default]
    Strict,
    /// Every failure is replaced by a synthetic "delivered (fallback)" event.
    Fallback,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CarriersConfig {
    #[serde(default)]
    pub ghn: GhnConfig,
    #[serde(default)]
    pub spx: EndpointConfig,
    #[serde(default)]
    pub vtp: VtpConfig,
    #[serde(default)]
    pub jnt: EndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GhnConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_ghn_mode")]
    pub mode: FailureMode,
}

fn default_ghn_mode() -> FailureMode {
    FailureMode::Fallback
}

impl Default for GhnConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            mode: default_ghn_mode(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VtpConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_vtp_app_id")]
    pub app_id: SecretRef,
    #[serde(default = "default_vtp_token")]
    pub token: SecretRef,
}

fn default_vtp_app_id() -> SecretRef {
    SecretRef::from_env("VTP_APP_ID")
}

fn default_vtp_token() -> SecretRef {
    SecretRef::from_env("VTP_TOKEN")
}

impl Default for VtpConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            app_id: default_vtp_app_id(),
            token: default_vtp_token(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bot_token")]
    pub bot_token: SecretRef,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_title")]
    pub title: String,
    /// Override for the Bot API base URL.
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_bot_token() -> SecretRef {
    SecretRef::from_env("TELEGRAM_BOT_TOKEN")
}

fn default_title() -> String {
    "ShipTrack".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: default_bot_token(),
            chat_id: None,
            title: default_title(),
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Forget auxiliary credentials after this long. `None` keeps them for
    /// the lifetime of the process.
    #[serde(default)]
    pub credential_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}
