//! Offline carrier for demos and tests.
//!
//! The status bucket is a pure function of the tracking code (CRC-32, so it is
//! stable across processes); location and time are random on every call.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use super::{AuxCredential, TrackingSource};
use crate::error::CarrierError;
use crate::model::{Carrier, VendorEvent};

const STATES: [(&str, &str); 4] = [
    ("ready_to_pick", "Đã tạo vận đơn"),
    ("in_transit", "Đang trung chuyển"),
    ("delivery", "Đang giao"),
    ("delivered", "Đã giao"),
];

const CITIES: &[&str] = &["Hà Nội", "Đà Nẵng", "TP.HCM", "Cần Thơ", "Nha Trang"];

/// Random advance applied on top of the base bucket: usually none.
const ADVANCE: [usize; 3] = [0, 0, 1];

#[derive(Debug, Default)]
pub struct MockSource;

impl MockSource {
    pub fn new() -> Self {
        Self
    }
}

/// Base status bucket for `tracking_code`, in `0..4`.
pub fn base_bucket(tracking_code: &str) -> usize {
    (crc32fast::hash(tracking_code.as_bytes()) % STATES.len() as u32) as usize
}

#[async_trait]
impl TrackingSource for MockSource {
    fn carrier(&self) -> Carrier {
        Carrier::Mock
    }

    async fn fetch(
        &self,
        tracking_code: &str,
        _credential: Option<&AuxCredential>,
    ) -> Result<VendorEvent, CarrierError> {
        let mut rng = rand::thread_rng();

        let advance = ADVANCE.choose(&mut rng).copied().unwrap_or(0);
        let index = (base_bucket(tracking_code) + advance).min(STATES.len() - 1);
        let (code, text) = STATES[index];
        let location = CITIES.choose(&mut rng).copied().unwrap_or_default();
        let time = Utc::now() - Duration::minutes(rng.gen_range(5..=180));

        Ok(VendorEvent {
            code: code.to_string(),
            text: text.to_string(),
            location: location.to_string(),
            time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_is_stable() {
        for code in ["GYVBHWD7", "SPXVN123", ""] {
            assert_eq!(base_bucket(code), base_bucket(code));
            assert!(base_bucket(code) < 4);
        }
    }

    #[tokio::test]
    async fn test_fetch_stays_within_bucket_range() {
        let source = MockSource::new();
        let code = "MOCK-0001";
        let base = base_bucket(code);

        for _ in 0..20 {
            let event = source.fetch(code, None).await.unwrap();
            let index = STATES.iter().position(|(c, _)| *c == event.code).unwrap();
            assert!(index == base || index == (base + 1).min(3));
            assert!(CITIES.contains(&event.location.as_str()));

            let age = Utc::now() - event.time;
            assert!(age >= Duration::minutes(5) && age <= Duration::minutes(181));
        }
    }
}
