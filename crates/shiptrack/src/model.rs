//! Core tracking types shared by carriers, the normalizer, and the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ShipTrackError;

/// The fixed set of supported carriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Carrier {
    Ghn,
    Spx,
    Vtp,
    Jnt,
    Mock,
}

impl Carrier {
    pub const ALL: [Carrier; 5] = [
        Carrier::Ghn,
        Carrier::Spx,
        Carrier::Vtp,
        Carrier::Jnt,
        Carrier::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Carrier::Ghn => "ghn",
            Carrier::Spx => "spx",
            Carrier::Vtp => "vtp",
            Carrier::Jnt => "jnt",
            Carrier::Mock => "mock",
        }
    }

    /// Whether lookups for this carrier need an auxiliary credential.
    pub fn requires_credential(&self) -> bool {
        matches!(self, Carrier::Jnt)
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Carrier {
    type Err = ShipTrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Carrier::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| ShipTrackError::UnknownCarrier(s.to_string()))
    }
}

/// Carrier-agnostic shipment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnifiedStatus {
    Created,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    /// Failed delivery or return; may be terminal or recover later.
    Exception,
}

impl UnifiedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnifiedStatus::Created => "CREATED",
            UnifiedStatus::PickedUp => "PICKED_UP",
            UnifiedStatus::InTransit => "IN_TRANSIT",
            UnifiedStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            UnifiedStatus::Delivered => "DELIVERED",
            UnifiedStatus::Exception => "EXCEPTION",
        }
    }
}

impl fmt::Display for UnifiedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnifiedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(UnifiedStatus::Created),
            "PICKED_UP" => Ok(UnifiedStatus::PickedUp),
            "IN_TRANSIT" => Ok(UnifiedStatus::InTransit),
            "OUT_FOR_DELIVERY" => Ok(UnifiedStatus::OutForDelivery),
            "DELIVERED" => Ok(UnifiedStatus::Delivered),
            "EXCEPTION" => Ok(UnifiedStatus::Exception),
            other => Err(format!("unknown unified status '{}'", other)),
        }
    }
}

/// Latest checkpoint as reported by one carrier, in that carrier's vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorEvent {
    pub code: String,
    pub text: String,
    /// Free text; empty when the carrier did not report one.
    pub location: String,
    pub time: DateTime<Utc>,
}

/// Carrier-agnostic projection of a [`VendorEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnifiedEvent {
    pub code: UnifiedStatus,
    pub text: String,
    pub location: Option<String>,
    pub time: DateTime<Utc>,
    /// The originating vendor event, kept for audit.
    pub raw: VendorEvent,
}

/// Flattened snapshot of the most recent unified event, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastStatus {
    pub code: UnifiedStatus,
    pub text: String,
    pub time: DateTime<Utc>,
    pub location: Option<String>,
}

impl LastStatus {
    /// Field-wise comparison against an incoming event. Any difference counts,
    /// including a refreshed timestamp on an otherwise identical checkpoint.
    pub fn differs_from(&self, event: &UnifiedEvent) -> bool {
        self.code != event.code
            || self.text != event.text
            || self.time != event.time
            || self.location != event.location
    }
}

impl From<&UnifiedEvent> for LastStatus {
    fn from(event: &UnifiedEvent) -> Self {
        Self {
            code: event.code,
            text: event.text.clone(),
            time: event.time,
            location: event.location.clone(),
        }
    }
}

/// A tracked shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shipment {
    pub id: i64,
    pub label: String,
    pub carrier: Carrier,
    pub tracking_code: String,
    pub last_status: LastStatus,
    pub auto_poll: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recorded status change for a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLogEntry {
    pub id: i64,
    pub shipment_id: i64,
    pub status: LastStatus,
    /// JSON of the vendor event that produced this change.
    pub raw_payload: String,
    pub recorded_at: DateTime<Utc>,
}

/// Direct edits to a shipment that do not go through a carrier fetch.
#[derive(Debug, Clone, Default)]
pub struct ShipmentEdit {
    pub label: Option<String>,
    pub carrier: Option<Carrier>,
    pub tracking_code: Option<String>,
    pub auto_poll: Option<bool>,
}

impl ShipmentEdit {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.carrier.is_none()
            && self.tracking_code.is_none()
            && self.auto_poll.is_none()
    }
}
