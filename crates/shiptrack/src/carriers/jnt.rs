//! J&T Express lookup through the tramavandon.com proxy.
//!
//! Lookups need the last four digits of the recipient's phone number, which
//! is validated before any request is sent.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use super::{
    parse_instant, parse_json, phone_suffix, read_body, select_latest, AuxCredential,
    TrackingSource,
};
use crate::error::{CarrierError, UnavailableCause};
use crate::model::{Carrier, VendorEvent};

pub const DEFAULT_ENDPOINT: &str = "https://tramavandon.com/api/jtexpress.php";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

static RE_LOCATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]+)\)").unwrap());

#[derive(Debug, Deserialize)]
struct Checkpoint {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl Checkpoint {
    fn instant(&self) -> Option<chrono::DateTime<Utc>> {
        let date = self.date.as_deref()?.trim();
        let time = self.time.as_deref().unwrap_or("00:00:00").trim();
        parse_instant(&format!("{} {}", date, time))
    }
}

pub struct JntSource {
    client: reqwest::Client,
    endpoint: String,
}

impl JntSource {
    pub fn new(client: reqwest::Client, endpoint: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        }
    }

    async fn request(&self, tracking_code: &str, phone: &str) -> Result<VendorEvent, UnavailableCause> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("tracking_id", tracking_code), ("tracking_phone", phone)])
            .header("accept", "*/*")
            .header("accept-language", "vi,en-US;q=0.9,en;q=0.8")
            .header("cache-control", "no-cache")
            .header("origin", "https://tramavandon.com")
            .header("pragma", "no-cache")
            .header("referer", "https://tramavandon.com/jtexpress/")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-site", "same-origin")
            .header("user-agent", USER_AGENT)
            .header("x-requested-with", "XMLHttpRequest")
            .send()
            .await?;

        let body = read_body(response).await?;
        parse_response(&body)
    }
}

#[async_trait]
impl TrackingSource for JntSource {
    fn carrier(&self) -> Carrier {
        Carrier::Jnt
    }

    async fn fetch(
        &self,
        tracking_code: &str,
        credential: Option<&AuxCredential>,
    ) -> Result<VendorEvent, CarrierError> {
        let phone = phone_suffix(Carrier::Jnt, credential)?;
        self.request(tracking_code, phone)
            .await
            .map_err(|cause| CarrierError::unavailable(Carrier::Jnt, cause))
    }
}

/// Derives a J&T status code from a Vietnamese checkpoint description.
pub fn classify(description: &str) -> &'static str {
    let s = description.to_lowercase();
    if s.contains("ký nhận") || s.contains("đã giao") {
        "delivered"
    } else if s.contains("đang giao") {
        "delivering"
    } else if s.contains("chuyển đến") || s.contains("đang chuyển") {
        "transporting"
    } else if s.contains("nhận hàng") {
        "received"
    } else {
        "in_transit"
    }
}

/// The first parenthesised fragment of a description, e.g. the hub name.
pub fn extract_location(description: &str) -> &str {
    RE_LOCATION
        .captures(description)
        .and_then(|c| c.get(1))
        .map_or("", |m| m.as_str())
}

fn parse_response(body: &[u8]) -> Result<VendorEvent, UnavailableCause> {
    let payload: Value = parse_json(body)?;

    if let Some(map) = payload.as_object() {
        if map.get("errors").and_then(Value::as_i64) == Some(-1) {
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("J&T Express API error");
            return Err(UnavailableCause::Rejected(message.to_string()));
        }
        return Err(UnavailableCause::Malformed(
            "expected an array of checkpoints".to_string(),
        ));
    }

    let checkpoints: Vec<Checkpoint> =
        serde_json::from_value(payload).map_err(|e| UnavailableCause::Malformed(e.to_string()))?;

    let latest = select_latest(&checkpoints, Checkpoint::instant).ok_or(UnavailableCause::NoData)?;

    let description = latest.description.as_deref().unwrap_or_default().trim();

    Ok(VendorEvent {
        code: classify(description).to_string(),
        text: description.to_string(),
        location: extract_location(description).trim().to_string(),
        time: latest.instant().unwrap_or_else(Utc::now),
    })
}
