//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};

use shiptrack::config::{DatabaseConfig, DuplicatePolicy, RefreshConfig};
use shiptrack::VendorEvent;

/// A fixed instant so stored times compare deterministically.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 24, 1, 30, 0).unwrap()
}

/// Builder for carrier-side `VendorEvent`s.
pub struct VendorEventBuilder {
    code: String,
    text: String,
    location: String,
    time: DateTime<Utc>,
}

impl VendorEventBuilder {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            text: format!("status {}", code),
            location: String::new(),
            time: base_time(),
        }
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    /// Shift the checkpoint time by `minutes` after the base time.
    pub fn minutes_later(mut self, minutes: i64) -> Self {
        self.time = base_time() + Duration::minutes(minutes);
        self
    }

    pub fn build(self) -> VendorEvent {
        VendorEvent {
            code: self.code,
            text: self.text,
            location: self.location,
            time: self.time,
        }
    }
}

/// Builder for the refresh and database settings a harness runs with.
pub struct SettingsBuilder {
    refresh: RefreshConfig,
    database: DatabaseConfig,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            refresh: RefreshConfig {
                concurrency: 4,
                timeout_secs: 5,
            },
            database: DatabaseConfig::default(),
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.refresh.timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.refresh.concurrency = concurrency;
        self
    }

    pub fn record_history(mut self, enabled: bool) -> Self {
        self.database.record_history = enabled;
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.database.duplicate_policy = policy;
        self
    }

    pub fn build(self) -> (RefreshConfig, DatabaseConfig) {
        (self.refresh, self.database)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
