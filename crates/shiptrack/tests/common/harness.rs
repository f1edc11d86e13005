//! Test harness for orchestrator-level tests.
//!
//! `ScriptedSource` stands in for a carrier endpoint: each tracking code is
//! answered from a script the test can rewrite between refreshes, and every
//! call is counted.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shiptrack::carriers::{AuxCredential, CarrierSet, TrackingSource};
use shiptrack::config::{DatabaseConfig, RefreshConfig};
use shiptrack::db::Database;
use shiptrack::{
    Carrier, CarrierError, ChangeNotice, Notifier, RefreshOrchestrator, SessionContext,
    ShipmentStore, UnavailableCause, VendorEvent,
};

use super::builders::SettingsBuilder;

/// How a scripted carrier answers one tracking code.
#[derive(Debug, Clone)]
pub enum Reply {
    Event(VendorEvent),
    /// Fails with `UnavailableCause::Rejected(message)`.
    Reject(String),
    /// Never answers within any sane deadline.
    Hang,
}

pub struct ScriptedSource {
    carrier: Carrier,
    replies: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
    credentials_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedSource {
    pub fn new(carrier: Carrier) -> Arc<Self> {
        Arc::new(Self {
            carrier,
            replies: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            credentials_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn reply(&self, tracking_code: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .insert(tracking_code.to_string(), reply);
    }

    pub fn event(&self, tracking_code: &str, event: VendorEvent) {
        self.reply(tracking_code, Reply::Event(event));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Credentials passed to `fetch`, in call order.
    pub fn credentials_seen(&self) -> Vec<Option<String>> {
        self.credentials_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingSource for ScriptedSource {
    fn carrier(&self) -> Carrier {
        self.carrier
    }

    async fn fetch(
        &self,
        tracking_code: &str,
        credential: Option<&AuxCredential>,
    ) -> Result<VendorEvent, CarrierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen
            .lock()
            .unwrap()
            .push(credential.map(|c| c.as_str().to_string()));

        let reply = self.replies.lock().unwrap().get(tracking_code).cloned();
        match reply {
            Some(Reply::Event(event)) => Ok(event),
            Some(Reply::Reject(message)) => Err(CarrierError::unavailable(
                self.carrier,
                UnavailableCause::Rejected(message),
            )),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CarrierError::unavailable(self.carrier, UnavailableCause::NoData))
            }
            None => Err(CarrierError::unavailable(self.carrier, UnavailableCause::NoData)),
        }
    }
}

/// Collects every notice it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<ChangeNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<ChangeNotice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }

    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .notices()
            .into_iter()
            .map(|n| n.tracking_code)
            .collect();
        codes.sort();
        codes
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: &ChangeNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

/// An orchestrator over an in-memory database.
pub struct TestHarness {
    pub orchestrator: RefreshOrchestrator,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    /// Harness with default settings over the given sources.
    pub fn new(sources: &[Arc<dyn TrackingSource>]) -> Self {
        let (refresh, database) = SettingsBuilder::new().build();
        Self::with_settings(sources, &refresh, &database)
    }

    pub fn with_settings(
        sources: &[Arc<dyn TrackingSource>],
        refresh: &RefreshConfig,
        database: &DatabaseConfig,
    ) -> Self {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let store = ShipmentStore::new(db, database);

        let carriers = sources
            .iter()
            .fold(CarrierSet::default(), |set, source| {
                set.with_arc(Arc::clone(source))
            });

        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = RefreshOrchestrator::new(
            store,
            carriers,
            notifier.clone(),
            SessionContext::new(),
            refresh,
        );

        Self {
            orchestrator,
            notifier,
        }
    }
}
