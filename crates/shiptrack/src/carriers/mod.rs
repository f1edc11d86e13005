//! Carrier adapters.
//!
//! Each supported carrier implements [`TrackingSource`]: one outbound request
//! per lookup, reduced to the latest checkpoint as a [`VendorEvent`]. The
//! [`CarrierSet`] owns one source per [`Carrier`] and is what the refresh
//! orchestrator dispatches through.

pub mod ghn;
pub mod jnt;
pub mod mock;
pub mod spx;
pub mod vtp;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, Response};

use crate::config::CarriersConfig;
use crate::error::{CarrierError, ConfigError, UnavailableCause};
use crate::model::{Carrier, VendorEvent};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-side deadline for a single carrier request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Carriers without an explicit offset report Vietnam local time.
const LOCAL_OFFSET_SECS: i32 = 7 * 3600;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A lookup against one carrier's tracking endpoint.
#[async_trait]
pub trait TrackingSource: Send + Sync {
    fn carrier(&self) -> Carrier;

    /// Fetches the latest checkpoint for `tracking_code`.
    ///
    /// `credential` is only consulted by carriers for which
    /// [`Carrier::requires_credential`] is true.
    async fn fetch(
        &self,
        tracking_code: &str,
        credential: Option<&AuxCredential>,
    ) -> Result<VendorEvent, CarrierError>;
}

/// Extra lookup secret some carriers require next to the tracking code,
/// such as the last four digits of the recipient's phone number.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AuxCredential(String);

impl AuxCredential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks the credential against what `carrier` accepts. Carriers that
    /// take no credential accept anything, including nothing.
    pub fn validate_for(
        carrier: Carrier,
        credential: Option<&AuxCredential>,
    ) -> Result<(), CarrierError> {
        if !carrier.requires_credential() {
            return Ok(());
        }
        phone_suffix(carrier, credential).map(|_| ())
    }
}

// Credentials are user secrets; keep them out of logs.
impl fmt::Debug for AuxCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuxCredential(****)")
    }
}

/// Returns the credential as a phone suffix: exactly four ASCII digits.
pub(crate) fn phone_suffix(
    carrier: Carrier,
    credential: Option<&AuxCredential>,
) -> Result<&str, CarrierError> {
    let Some(credential) = credential else {
        return Err(CarrierError::InvalidCredential {
            carrier,
            reason: "the last 4 digits of the recipient phone number are required".to_string(),
        });
    };

    let value = credential.as_str();
    if value.len() == 4 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(value)
    } else {
        Err(CarrierError::InvalidCredential {
            carrier,
            reason: "phone suffix must be exactly 4 digits".to_string(),
        })
    }
}

/// One [`TrackingSource`] per carrier.
#[derive(Clone, Default)]
pub struct CarrierSet {
    sources: HashMap<Carrier, Arc<dyn TrackingSource>>,
}

impl CarrierSet {
    /// Builds the production adapters from configuration. All adapters share
    /// one HTTP client.
    pub fn from_config(config: &CarriersConfig) -> Result<Self, ConfigError> {
        let client = http_client().map_err(|e| ConfigError::Validation {
            message: format!("Failed to create HTTP client: {}", e),
        })?;

        let vtp = vtp::VtpSource::from_config(client.clone(), &config.vtp)?;

        Ok(Self::default()
            .with(ghn::GhnSource::new(
                client.clone(),
                config.ghn.endpoint.clone(),
                config.ghn.mode,
            ))
            .with(spx::SpxSource::new(client.clone(), config.spx.endpoint.clone()))
            .with(vtp)
            .with(jnt::JntSource::new(client, config.jnt.endpoint.clone()))
            .with(mock::MockSource::new()))
    }

    /// Registers `source`, replacing any source already held for its carrier.
    pub fn with<S: TrackingSource + 'static>(self, source: S) -> Self {
        self.with_arc(Arc::new(source))
    }

    pub fn with_arc(mut self, source: Arc<dyn TrackingSource>) -> Self {
        self.sources.insert(source.carrier(), source);
        self
    }

    pub fn get(&self, carrier: Carrier) -> Option<Arc<dyn TrackingSource>> {
        self.sources.get(&carrier).cloned()
    }

    pub fn carriers(&self) -> impl Iterator<Item = Carrier> + '_ {
        self.sources.keys().copied()
    }
}

pub(crate) fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Reads a successful response body. Non-2xx statuses and empty bodies are
/// reported as [`UnavailableCause`]s.
pub(crate) async fn read_body(response: Response) -> Result<Vec<u8>, UnavailableCause> {
    let status = response.status();
    if !status.is_success() {
        return Err(UnavailableCause::Status(status.as_u16()));
    }

    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(UnavailableCause::EmptyBody);
    }
    Ok(bytes.to_vec())
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, UnavailableCause> {
    serde_json::from_slice(body).map_err(|e| UnavailableCause::Malformed(e.to_string()))
}

/// Picks the latest item: the maximum timestamp wins, equal timestamps go to
/// the item that came last, and items without a timestamp rank below every
/// timestamped one. When no item has a timestamp the last item wins.
pub fn select_latest<T, F>(items: &[T], time_of: F) -> Option<&T>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    let mut best: Option<(&T, Option<DateTime<Utc>>)> = None;
    for item in items {
        let time = time_of(item);
        match &best {
            Some((_, best_time)) if time < *best_time => {}
            _ => best = Some((item, time)),
        }
    }
    best.map(|(item, _)| item)
}

pub(crate) fn local_offset() -> Option<FixedOffset> {
    FixedOffset::east_opt(LOCAL_OFFSET_SECS)
}

/// Parses an ISO-8601 timestamp. `Z` and explicit offsets are honoured;
/// naive values are read as Vietnam local time.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .and_then(|naive| local_offset()?.from_local_datetime(&naive).single())
        .map(|t| t.with_timezone(&Utc))
}

/// Interprets a Unix timestamp in seconds.
pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}
