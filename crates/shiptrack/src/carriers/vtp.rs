//! Viettel Post partner tracking API.
//!
//! Partner deployments disagree on the HTTP method, so a failed GET is
//! retried once as a JSON POST before the lookup is reported unavailable.

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::{parse_instant, parse_json, read_body, AuxCredential, TrackingSource};
use crate::config::VtpConfig;
use crate::error::{CarrierError, ConfigError, UnavailableCause};
use crate::model::{Carrier, VendorEvent};

pub const DEFAULT_ENDPOINT: &str = "https://partner.viettelpost.vn/v2/order/tracking";

struct Credentials {
    app_id: SecretString,
    token: SecretString,
}

pub struct VtpSource {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<Credentials>,
}

impl VtpSource {
    pub fn new(
        client: reqwest::Client,
        endpoint: Option<String>,
        app_id: Option<SecretString>,
        token: Option<SecretString>,
    ) -> Self {
        let credentials = match (app_id, token) {
            (Some(app_id), Some(token)) => Some(Credentials { app_id, token }),
            _ => None,
        };
        Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            credentials,
        }
    }

    /// Resolves the partner credentials. Unset credentials are allowed here
    /// and reported per lookup instead.
    pub fn from_config(client: reqwest::Client, config: &VtpConfig) -> Result<Self, ConfigError> {
        let app_id = config
            .app_id
            .resolve_optional()
            .map_err(|source| ConfigError::Secret {
                name: "carriers.vtp.app_id".to_string(),
                source,
            })?;
        let token = config
            .token
            .resolve_optional()
            .map_err(|source| ConfigError::Secret {
                name: "carriers.vtp.token".to_string(),
                source,
            })?;
        Ok(Self::new(client, config.endpoint.clone(), app_id, token))
    }

    async fn request(&self, tracking_code: &str) -> Result<VendorEvent, UnavailableCause> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            UnavailableCause::NotConfigured("VTP app id and token are required".to_string())
        })?;

        let first = self
            .get(tracking_code, credentials)
            .await
            .and_then(|payload| parse_payload(&payload));

        match first {
            Ok(event) => Ok(event),
            Err(cause) => {
                debug!("VTP GET for {} failed ({}); retrying as POST", tracking_code, cause);
                let payload = self.post(tracking_code, credentials).await?;
                parse_payload(&payload)
            }
        }
    }

    async fn get(
        &self,
        tracking_code: &str,
        credentials: &Credentials,
    ) -> Result<Value, UnavailableCause> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("code", tracking_code)])
            .header("Accept", "application/json")
            .bearer_auth(credentials.token.expose_secret())
            .header("x-client-id", credentials.app_id.expose_secret())
            .send()
            .await?;
        parse_json(&read_body(response).await?)
    }

    async fn post(
        &self,
        tracking_code: &str,
        credentials: &Credentials,
    ) -> Result<Value, UnavailableCause> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "code": tracking_code }))
            .header("Accept", "application/json")
            .bearer_auth(credentials.token.expose_secret())
            .header("x-client-id", credentials.app_id.expose_secret())
            .send()
            .await?;
        parse_json(&read_body(response).await?)
    }
}

#[async_trait]
impl TrackingSource for VtpSource {
    fn carrier(&self) -> Carrier {
        Carrier::Vtp
    }

    async fn fetch(
        &self,
        tracking_code: &str,
        _credential: Option<&AuxCredential>,
    ) -> Result<VendorEvent, CarrierError> {
        self.request(tracking_code)
            .await
            .map_err(|cause| CarrierError::unavailable(Carrier::Vtp, cause))
    }
}

/// First present field among `keys`, rendered as text. Numbers are accepted
/// since some partners send numeric status codes.
fn field(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match data.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

const CODE_KEYS: &[&str] = &["status_code", "STATUS_CODE"];
const TEXT_KEYS: &[&str] = &["status_text", "STATUS"];

/// Reads the tracking object. A body without any status field is an error
/// response (or garbage), never a checkpoint.
fn parse_payload(payload: &Value) -> Result<VendorEvent, UnavailableCause> {
    if !payload.is_object() {
        return Err(UnavailableCause::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(payload)
        )));
    }

    // Some partners return the tracking object at the root.
    let data = match payload.get("data") {
        Some(data @ Value::Object(_)) => data,
        _ => payload,
    };

    let code = field(data, CODE_KEYS);
    let text = field(data, TEXT_KEYS);
    if code.is_none() && text.is_none() {
        return Err(match field(payload, &["message", "MESSAGE"]) {
            Some(message) => UnavailableCause::Rejected(message),
            None => UnavailableCause::Malformed("no status field in response".to_string()),
        });
    }

    Ok(VendorEvent {
        code: code.unwrap_or_else(|| "TRANSPORT".to_string()),
        text: text.unwrap_or_else(|| "Đang xử lý".to_string()),
        location: field(data, &["location", "CURRENT_POST"]).unwrap_or_default(),
        time: field(data, &["time_iso", "UPDATE_TIME"])
            .as_deref()
            .and_then(parse_instant)
            .unwrap_or_else(Utc::now),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
