//! GHN (Giao Hàng Nhanh) public tracking-log endpoint.
//!
//! GHN frequently blocks non-browser traffic, so the adapter runs in one of
//! two explicit modes. [`FailureMode::Strict`] surfaces every failure;
//! [`FailureMode::Fallback`] answers every failure with a synthetic
//! "delivered" checkpoint so batch refreshes never stall on GHN.
//!
//! The synthetic checkpoint is stable for the length of an outage: its time
//! is the instant of the first failed lookup for that code, so repeated
//! polls do not read as status changes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use moka::sync::Cache;
use serde::Deserialize;

use super::{parse_instant, parse_json, read_body, select_latest, AuxCredential, TrackingSource};
use crate::config::FailureMode;
use crate::error::{CarrierError, UnavailableCause};
use crate::model::{Carrier, VendorEvent};

pub const DEFAULT_ENDPOINT: &str =
    "https://fe-online-gateway.ghn.vn/order-tracking/public-api/client/tracking-logs";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 ShipTrack/1.0";

pub const FALLBACK_CODE: &str = "delivered";
pub const FALLBACK_TEXT: &str = "Giao hàng thành công (fallback)";
pub const FALLBACK_LOCATION: &str = "Việt Nam";

const MAX_OUTAGES: u64 = 10_000;

const STATUS_LABELS: &[(&str, &str)] = &[
    ("ready_to_pick", "Chờ lấy hàng"),
    ("picking", "Đang lấy hàng"),
    ("picked", "Đã lấy hàng"),
    ("storing", "Đang lưu kho"),
    ("transporting", "Đang luân chuyển"),
    ("sorting", "Đang phân loại"),
    ("delivering", "Đang giao hàng"),
    ("delivered", "Giao hàng thành công"),
    ("delivery_fail", "Giao hàng thất bại"),
    ("waiting_to_return", "Chờ trả hàng"),
    ("returned", "Đã trả hàng"),
];

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<TrackingData>,
}

#[derive(Debug, Deserialize)]
struct TrackingData {
    #[serde(default)]
    tracking_logs: Vec<TrackingLog>,
}

#[derive(Debug, Deserialize)]
struct TrackingLog {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_name: Option<String>,
    #[serde(default)]
    action_at: Option<String>,
    #[serde(default)]
    location: Option<LogLocation>,
}

#[derive(Debug, Deserialize)]
struct LogLocation {
    #[serde(default)]
    address: Option<String>,
}

pub struct GhnSource {
    client: reqwest::Client,
    endpoint: String,
    mode: FailureMode,
    /// First failed lookup per tracking code, cleared once GHN answers again.
    outages: Cache<String, DateTime<Utc>>,
}

impl GhnSource {
    pub fn new(client: reqwest::Client, endpoint: Option<String>, mode: FailureMode) -> Self {
        Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            mode,
            outages: Cache::builder().max_capacity(MAX_OUTAGES).build(),
        }
    }

    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    async fn request(&self, tracking_code: &str) -> Result<VendorEvent, UnavailableCause> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "vi-VN,vi;q=0.9,en-US;q=0.6,en;q=0.5")
            .header("Cache-Control", "no-cache")
            .header("Origin", "https://donhang.ghn.vn")
            .header("Pragma", "no-cache")
            .header("Referer", "https://donhang.ghn.vn/")
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-site")
            .header("User-Agent", USER_AGENT)
            .json(&serde_json::json!({ "order_code": tracking_code }))
            .send()
            .await?;

        let body = read_body(response).await?;
        parse_response(&body)
    }
}

#[async_trait]
impl TrackingSource for GhnSource {
    fn carrier(&self) -> Carrier {
        Carrier::Ghn
    }

    async fn fetch(
        &self,
        tracking_code: &str,
        _credential: Option<&AuxCredential>,
    ) -> Result<VendorEvent, CarrierError> {
        match self.request(tracking_code).await {
            Ok(event) => {
                if self.outages.remove(tracking_code).is_some() {
                    debug!("GHN answers again for {}", tracking_code);
                }
                Ok(event)
            }
            Err(cause) => match self.mode {
                FailureMode::Strict => Err(CarrierError::unavailable(Carrier::Ghn, cause)),
                FailureMode::Fallback => {
                    warn!(
                        "GHN lookup for {} failed ({}); using fallback event",
                        tracking_code, cause
                    );
                    let since = self.outages.get_with(tracking_code.to_string(), Utc::now);
                    Ok(fallback_event(since))
                }
            },
        }
    }
}

/// The synthetic checkpoint returned in fallback mode, stamped with the
/// start of the outage.
pub fn fallback_event(since: DateTime<Utc>) -> VendorEvent {
    VendorEvent {
        code: FALLBACK_CODE.to_string(),
        text: FALLBACK_TEXT.to_string(),
        location: FALLBACK_LOCATION.to_string(),
        time: since,
    }
}

fn status_label(code: &str) -> Option<&'static str> {
    STATUS_LABELS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
}

fn parse_response(body: &[u8]) -> Result<VendorEvent, UnavailableCause> {
    let envelope: Envelope = parse_json(body)?;

    let data = match (envelope.code, envelope.data) {
        (Some(200), Some(data)) => data,
        (_, _) => {
            return Err(UnavailableCause::Rejected(
                envelope.message.unwrap_or_else(|| "no data".to_string()),
            ))
        }
    };

    let logs = data.tracking_logs;
    let latest = select_latest(&logs, |log| log.action_at.as_deref().and_then(parse_instant))
        .ok_or(UnavailableCause::NoData)?;

    let code = latest
        .status
        .as_deref()
        .or(latest.status_name.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string();

    let text = status_label(&code)
        .map(str::to_string)
        .or_else(|| latest.status_name.clone().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| {
            if code.is_empty() {
                "Không xác định".to_string()
            } else {
                code.clone()
            }
        });

    let location = latest
        .location
        .as_ref()
        .and_then(|l| l.address.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string();

    let time = latest
        .action_at
        .as_deref()
        .and_then(parse_instant)
        .unwrap_or_else(Utc::now);

    Ok(VendorEvent {
        code,
        text,
        location,
        time,
    })
}
