//! Change notifications.
//!
//! The orchestrator calls [`Notifier::notify`] once per detected status
//! change. Notifiers are fire-and-forget: they must return immediately and
//! never fail the refresh that triggered them.

use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::carriers::local_offset;
use crate::config::TelegramConfig;
use crate::error::ConfigError;
use crate::model::{Carrier, UnifiedEvent};

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

/// A shipment whose visible status just changed.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeNotice {
    pub shipment_id: i64,
    pub label: String,
    pub carrier: Carrier,
    pub tracking_code: String,
    pub event: UnifiedEvent,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &ChangeNotice);
}

/// Discards every notice.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notice: &ChangeNotice) {}
}

/// Writes every notice as an `info` log record.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &ChangeNotice) {
        info!(
            "Status changed: #{} {} ({} {}) -> {} \"{}\" at {}{}",
            notice.shipment_id,
            notice.label,
            notice.carrier,
            notice.tracking_code,
            notice.event.code,
            notice.event.text,
            notice.event.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            notice
                .event
                .location
                .as_deref()
                .map(|l| format!(" [{}]", l))
                .unwrap_or_default()
        );
    }
}

/// Delivers every notice to each inner notifier in order.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

impl Notifier for FanoutNotifier {
    fn notify(&self, notice: &ChangeNotice) {
        for notifier in &self.notifiers {
            notifier.notify(notice);
        }
    }
}

/// Posts a Markdown message through the Telegram Bot API.
///
/// Each message is sent from a task on the ambient tokio runtime; outside a
/// runtime the notice is dropped with a warning.
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
    title: String,
}

impl TelegramNotifier {
    pub fn new(
        bot_token: &SecretString,
        chat_id: impl Into<String>,
        title: impl Into<String>,
        api_base: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(TELEGRAM_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Validation {
                message: format!("Failed to create Telegram HTTP client: {}", e),
            })?;

        let base = api_base.unwrap_or(DEFAULT_TELEGRAM_API).trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", base, bot_token.expose_secret()),
            chat_id: chat_id.into(),
            title: title.into(),
        })
    }

    pub fn from_config(config: &TelegramConfig) -> Result<Self, ConfigError> {
        let token = config
            .bot_token
            .resolve()
            .map_err(|source| ConfigError::Secret {
                name: "telegram.bot_token".to_string(),
                source,
            })?;
        let chat_id = config.chat_id.clone().ok_or_else(|| ConfigError::Validation {
            message: "telegram.chat_id is required when telegram is enabled".to_string(),
        })?;
        Self::new(&token, chat_id, config.title.clone(), config.api_base.as_deref())
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, notice: &ChangeNotice) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "No async runtime; dropping Telegram notice for {}",
                notice.tracking_code
            );
            return;
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let chat_id = self.chat_id.clone();
        let text = pretty_message(&self.title, notice);
        let tracking_code = notice.tracking_code.clone();

        handle.spawn(async move {
            let form = [
                ("chat_id", chat_id.as_str()),
                ("text", text.as_str()),
                ("parse_mode", "Markdown"),
                ("disable_web_page_preview", "true"),
            ];
            match client.post(&endpoint).form(&form).send().await {
                Ok(response) => {
                    let status = response.status();
                    let ok = response
                        .json::<serde_json::Value>()
                        .await
                        .ok()
                        .and_then(|v| v.get("ok").and_then(serde_json::Value::as_bool))
                        .unwrap_or(false);
                    if ok {
                        debug!("Telegram notice sent for {}", tracking_code);
                    } else {
                        warn!(
                            "Telegram rejected notice for {} (HTTP {})",
                            tracking_code, status
                        );
                    }
                }
                // reqwest errors can embed the URL, which carries the bot token
                Err(e) => warn!(
                    "Telegram notice for {} failed: {}",
                    tracking_code,
                    e.without_url()
                ),
            }
        });
    }
}

/// Builds the notifier for a deployment: change logging, plus Telegram when
/// it is enabled.
pub fn from_config(config: &TelegramConfig) -> Result<Arc<dyn Notifier>, ConfigError> {
    if !config.enabled {
        return Ok(Arc::new(LogNotifier));
    }
    let telegram = TelegramNotifier::from_config(config)?;
    Ok(Arc::new(FanoutNotifier::new(vec![
        Arc::new(LogNotifier),
        Arc::new(telegram),
    ])))
}

/// Escapes the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '_' | '*' | '[' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Renders a notice as a Telegram Markdown message.
pub fn pretty_message(title: &str, notice: &ChangeNotice) -> String {
    let event = &notice.event;
    let mut lines = vec![
        format!("*{}* • Cập nhật trạng thái", escape_markdown(title)),
        format!(
            "*{}*  ({})",
            escape_markdown(&notice.label),
            escape_markdown(&notice.carrier.as_str().to_uppercase())
        ),
        format!("`{}`", escape_markdown(&notice.tracking_code)),
        format!("Trạng thái: *{}*", escape_markdown(&event.text)),
    ];

    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        lines.push(format!("Vị trí: {}", escape_markdown(location)));
    }

    let time = match local_offset() {
        Some(offset) => event
            .time
            .with_timezone(&offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false),
        None => event.time.to_rfc3339_opts(SecondsFormat::Secs, true),
    };
    lines.push(format!("Thời gian: `{}`", escape_markdown(&time)));

    lines.join("\n")
}
