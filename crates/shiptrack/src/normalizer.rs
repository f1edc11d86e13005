//! Reduces each carrier's status vocabulary to [`UnifiedStatus`].
//!
//! Every carrier owns one static table of known vendor codes. Codes missing
//! from the table fall back to a keyword check: anything that looks like a
//! failure or return becomes `EXCEPTION`, everything else `IN_TRANSIT`.

use crate::model::{Carrier, UnifiedEvent, UnifiedStatus, VendorEvent};

use UnifiedStatus::{Created, Delivered, Exception, InTransit, OutForDelivery, PickedUp};

/// Lower-case substrings that mark an unknown vendor status as a failure.
pub const FAILURE_KEYWORDS: &[&str] = &[
    "fail",
    "return",
    "cancel",
    "undeliver",
    "exception",
    "thất bại",
    "trả hàng",
    "hoàn hàng",
    "hủy",
];

const GHN_TABLE: &[(&str, UnifiedStatus)] = &[
    ("ready_to_pick", Created),
    ("picking", Created),
    ("picked", PickedUp),
    ("storing", InTransit),
    ("transporting", InTransit),
    ("sorting", InTransit),
    ("in_transit", InTransit),
    ("delivering", OutForDelivery),
    ("delivery", OutForDelivery),
    ("delivered", Delivered),
    ("delivery_fail", Exception),
    ("waiting_to_return", Exception),
    ("return", Exception),
    ("returned", Exception),
];

const SPX_TABLE: &[(&str, UnifiedStatus)] = &[
    ("PICKED", PickedUp),
    ("TRANSIT", InTransit),
    ("OFD", OutForDelivery),
    ("DLV", Delivered),
    ("FAIL", Exception),
];

const VTP_TABLE: &[(&str, UnifiedStatus)] = &[
    ("CREATED", Created),
    ("PICKUP_SUCCESS", PickedUp),
    ("TRANSPORT", InTransit),
    ("DELIVERING", OutForDelivery),
    ("DELIVERED", Delivered),
    ("RETURN", Exception),
];

const JNT_TABLE: &[(&str, UnifiedStatus)] = &[
    ("received", PickedUp),
    ("transporting", InTransit),
    ("in_transit", InTransit),
    ("delivering", OutForDelivery),
    ("delivered", Delivered),
];

const MOCK_TABLE: &[(&str, UnifiedStatus)] = &[
    ("ready_to_pick", Created),
    ("in_transit", InTransit),
    ("delivery", OutForDelivery),
    ("delivered", Delivered),
];

/// Per-carrier vendor-code tables.
pub struct StatusMapper;

impl StatusMapper {
    /// The immutable mapping table owned by `carrier`.
    pub fn table(carrier: Carrier) -> &'static [(&'static str, UnifiedStatus)] {
        match carrier {
            Carrier::Ghn => GHN_TABLE,
            Carrier::Spx => SPX_TABLE,
            Carrier::Vtp => VTP_TABLE,
            Carrier::Jnt => JNT_TABLE,
            Carrier::Mock => MOCK_TABLE,
        }
    }

    /// Exact lookup of a vendor code in the carrier's table.
    pub fn lookup(carrier: Carrier, vendor_code: &str) -> Option<UnifiedStatus> {
        Self::table(carrier)
            .iter()
            .find(|(code, _)| *code == vendor_code)
            .map(|(_, status)| *status)
    }

    /// Status for a code the table does not know.
    pub fn fallback(vendor_code: &str, text: &str) -> UnifiedStatus {
        if contains_failure_keyword(vendor_code) || contains_failure_keyword(text) {
            Exception
        } else {
            InTransit
        }
    }
}

fn contains_failure_keyword(value: &str) -> bool {
    let lowered = value.to_lowercase();
    FAILURE_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Projects a vendor event into a [`UnifiedEvent`]. Pure and infallible.
///
/// Text and time pass through unchanged; an empty location becomes `None`.
/// The result does not depend on the tracking code. Callers that want to
/// trace unmapped codes check [`StatusMapper::lookup`] themselves.
pub fn normalize(carrier: Carrier, _tracking_code: &str, vendor: VendorEvent) -> UnifiedEvent {
    let code = StatusMapper::lookup(carrier, &vendor.code)
        .unwrap_or_else(|| StatusMapper::fallback(&vendor.code, &vendor.text));

    let location = if vendor.location.trim().is_empty() {
        None
    } else {
        Some(vendor.location.clone())
    };

    UnifiedEvent {
        code,
        text: vendor.text.clone(),
        location,
        time: vendor.time,
        raw: vendor,
    }
}
