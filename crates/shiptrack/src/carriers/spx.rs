//! SPX Express open order-info endpoint.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{
    from_unix_seconds, parse_json, read_body, select_latest, AuxCredential, TrackingSource,
};
use crate::error::{CarrierError, UnavailableCause};
use crate::model::{Carrier, VendorEvent};

pub const DEFAULT_ENDPOINT: &str = "https://spx.vn/shipment/order/open/order/get_order_info";

const COOKIE: &str = "spx_token=0; spx_sid=0; login_status=true; nss_sys_type=true; nss_cid=VN";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    retcode: Option<i64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    data: Option<OrderData>,
}

#[derive(Debug, Default, Deserialize)]
struct OrderData {
    #[serde(default)]
    sls_tracking_info: Option<TrackingInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackingInfo {
    #[serde(default)]
    records: Vec<Record>,
}

#[derive(Debug, Clone, Deserialize)]
struct Record {
    #[serde(default)]
    display_flag: Option<i64>,
    #[serde(default)]
    actual_time: Option<i64>,
    #[serde(default)]
    tracking_name: Option<String>,
    #[serde(default)]
    milestone_name: Option<String>,
    #[serde(default)]
    tracking_code: Option<String>,
    #[serde(default)]
    buyer_description: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    current_location: Option<RecordLocation>,
    #[serde(default)]
    next_location: Option<RecordLocation>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordLocation {
    #[serde(default)]
    full_address: Option<String>,
    #[serde(default)]
    location_name: Option<String>,
}

pub struct SpxSource {
    client: reqwest::Client,
    endpoint: String,
}

impl SpxSource {
    pub fn new(client: reqwest::Client, endpoint: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        }
    }

    async fn request(&self, tracking_code: &str) -> Result<VendorEvent, UnavailableCause> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("spx_tn", tracking_code), ("language_code", "vi")])
            .header("accept", "application/json, text/plain, */*")
            .header("accept-language", "en-US,en;q=0.9")
            .header("cookie", COOKIE)
            .header("dnt", "1")
            .header("referer", "https://spx.vn/track")
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-site", "same-origin")
            .header("user-agent", USER_AGENT)
            .send()
            .await?;

        let body = read_body(response).await?;
        parse_response(&body)
    }
}

#[async_trait]
impl TrackingSource for SpxSource {
    fn carrier(&self) -> Carrier {
        Carrier::Spx
    }

    async fn fetch(
        &self,
        tracking_code: &str,
        _credential: Option<&AuxCredential>,
    ) -> Result<VendorEvent, CarrierError> {
        self.request(tracking_code)
            .await
            .map_err(|cause| CarrierError::unavailable(Carrier::Spx, cause))
    }
}

/// Derives an SPX status code from a milestone name.
pub fn classify(name: &str) -> &'static str {
    let s = name.to_lowercase();
    if s.is_empty() {
        return "TRANSIT";
    }
    if s.contains("delivered") || s.contains("đã giao") || s == "dlv" {
        "DLV"
    } else if s.contains("out for delivery") || s.contains("đang giao") || s == "ofd" {
        "OFD"
    } else if s.contains("in transit")
        || s.contains("vận chuyển")
        || s.contains("sorting")
        || s.contains("transport")
        || s == "transit"
    {
        "TRANSIT"
    } else if s.contains("pickup")
        || s.contains("picked")
        || s.contains("collected")
        || s.contains("đã lấy hàng")
    {
        "PICKED"
    } else if s.contains("unsuccessful") || s.contains("fail") || s.contains("return") {
        "FAIL"
    } else {
        "TRANSIT"
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|s| !s.trim().is_empty())
}

fn parse_response(body: &[u8]) -> Result<VendorEvent, UnavailableCause> {
    let envelope: Envelope = parse_json(body)?;

    if envelope.retcode != Some(0) || envelope.message.as_deref() != Some("success") {
        let detail = envelope
            .detail
            .or(envelope.message)
            .unwrap_or_else(|| "order not found".to_string());
        return Err(UnavailableCause::Rejected(detail));
    }

    let records = envelope
        .data
        .unwrap_or_default()
        .sls_tracking_info
        .unwrap_or_default()
        .records;

    let visible: Vec<Record> = records
        .iter()
        .filter(|r| r.display_flag.unwrap_or(1) == 1)
        .cloned()
        .collect();
    let candidates = if visible.is_empty() { &records } else { &visible };

    let latest = select_latest(candidates, |r| r.actual_time.and_then(from_unix_seconds))
        .ok_or(UnavailableCause::NoData)?;

    let name = first_non_empty(&[
        latest.tracking_name.as_deref(),
        latest.milestone_name.as_deref(),
        latest.tracking_code.as_deref(),
    ])
    .unwrap_or("In transit");

    let text = first_non_empty(&[
        latest.buyer_description.as_deref(),
        latest.description.as_deref(),
    ])
    .unwrap_or(name);

    let current = latest.current_location.as_ref();
    let location = first_non_empty(&[
        current.and_then(|l| l.full_address.as_deref()),
        current.and_then(|l| l.location_name.as_deref()),
        latest
            .next_location
            .as_ref()
            .and_then(|l| l.location_name.as_deref()),
    ])
    .unwrap_or_default();

    Ok(VendorEvent {
        code: classify(name).to_string(),
        text: text.to_string(),
        location: location.to_string(),
        time: latest
            .actual_time
            .and_then(from_unix_seconds)
            .unwrap_or_else(Utc::now),
    })
}
