//! Refresh orchestration: carrier fetch, normalization, change-aware
//! persistence and notification.
//!
//! This is the only entry point the CLI, HTTP and bot layers call into. Each
//! refresh of one shipment holds that shipment's async lock for the whole
//! fetch → normalize → update → notify sequence, so concurrent refreshes of the
//! same id serialize while different ids proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio::sync::Mutex as AsyncMutex;

use crate::carriers::{AuxCredential, CarrierSet};
use crate::config::RefreshConfig;
use crate::error::{CarrierError, Result, ShipTrackError, UnavailableCause};
use crate::model::{Carrier, Shipment, ShipmentEdit, StatusLogEntry, UnifiedEvent};
use crate::normalizer::{normalize, StatusMapper};
use crate::notifier::{ChangeNotice, Notifier};
use crate::session::SessionContext;
use crate::store::{CreateOutcome, ShipmentStore};

/// Result of [`RefreshOrchestrator::add`].
pub type AddOutcome = CreateOutcome;

/// Input for [`RefreshOrchestrator::add`].
#[derive(Debug, Clone, Default)]
pub struct NewShipment {
    pub label: String,
    /// Carrier name as typed by the user, e.g. `"ghn"`.
    pub carrier: String,
    pub tracking_code: String,
    pub credential: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The shipment as stored after the refresh.
    pub shipment: Shipment,
    pub changed: bool,
    pub event: UnifiedEvent,
}

#[derive(Debug)]
pub struct RefreshFailure {
    pub shipment_id: i64,
    pub tracking_code: String,
    pub error: ShipTrackError,
}

/// Summary of one [`RefreshOrchestrator::refresh_all`] pass.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Shipments a refresh was attempted for.
    pub attempted: usize,
    /// Shipments whose visible status changed.
    pub changed: usize,
    /// Shipments left out because their carrier needs a credential this
    /// session does not hold.
    pub skipped: usize,
    pub failures: Vec<RefreshFailure>,
}

pub struct RefreshOrchestrator {
    store: ShipmentStore,
    carriers: CarrierSet,
    notifier: Arc<dyn Notifier>,
    session: SessionContext,
    timeout: Duration,
    concurrency: usize,
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl RefreshOrchestrator {
    pub fn new(
        store: ShipmentStore,
        carriers: CarrierSet,
        notifier: Arc<dyn Notifier>,
        session: SessionContext,
        config: &RefreshConfig,
    ) -> Self {
        Self {
            store,
            carriers,
            notifier,
            session,
            timeout: config.timeout(),
            concurrency: config.concurrency.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ShipmentStore {
        &self.store
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Fetches the first status for a new shipment and stores it.
    ///
    /// Unknown carriers and missing or malformed credentials are rejected
    /// before any carrier request. A failed fetch stores nothing.
    pub async fn add(&self, new: NewShipment) -> Result<AddOutcome> {
        let carrier: Carrier = new.carrier.parse()?;
        let tracking_code = new.tracking_code.trim();
        if tracking_code.is_empty() {
            return Err(ShipTrackError::InvalidInput(
                "tracking code must not be empty".to_string(),
            ));
        }

        let credential = new.credential.map(AuxCredential::new);
        AuxCredential::validate_for(carrier, credential.as_ref())?;

        let event = self
            .fetch_unified(carrier, tracking_code, credential.as_ref())
            .await?;
        let outcome = self.store.create(&new.label, carrier, tracking_code, &event)?;

        if let Some(credential) = credential.filter(|_| carrier.requires_credential()) {
            self.session
                .remember(&outcome.shipment().tracking_code, credential);
        }

        Ok(outcome)
    }

    /// Refreshes one shipment and notifies when its visible status changed.
    /// A failed fetch leaves the stored shipment untouched.
    pub async fn refresh_one(&self, id: i64) -> Result<RefreshOutcome> {
        self.refresh_with(id, None).await
    }

    /// Refresh under the shipment's lock. A `held` credential is used as is;
    /// otherwise the session is consulted once the lock is taken.
    async fn refresh_with(&self, id: i64, held: Option<AuxCredential>) -> Result<RefreshOutcome> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let shipment = self.store.get(id)?;
        let credential = held.or_else(|| self.session.credential(&shipment.tracking_code));
        AuxCredential::validate_for(shipment.carrier, credential.as_ref())?;

        let event = self
            .fetch_unified(shipment.carrier, &shipment.tracking_code, credential.as_ref())
            .await?;
        let changed = self.store.update_from_unified(id, &event)?;
        let shipment = self.store.get(id)?;

        if changed {
            info!(
                "Shipment #{} ({} {}) is now {}",
                id, shipment.carrier, shipment.tracking_code, event.code
            );
            self.notifier.notify(&ChangeNotice {
                shipment_id: id,
                label: shipment.label.clone(),
                carrier: shipment.carrier,
                tracking_code: shipment.tracking_code.clone(),
                event: event.clone(),
            });
        } else {
            debug!("Shipment #{} unchanged", id);
        }

        Ok(RefreshOutcome {
            shipment,
            changed,
            event,
        })
    }

    /// Refreshes every shipment (or only auto-poll ones) with bounded
    /// concurrency. Per-shipment failures are logged and reported, never
    /// propagated.
    pub async fn refresh_all(&self, auto_poll_only: bool) -> Result<BatchReport> {
        let shipments = if auto_poll_only {
            self.store.list_auto_poll()?
        } else {
            self.store.list()?
        };

        let mut report = BatchReport::default();
        let mut candidates = Vec::with_capacity(shipments.len());
        for shipment in shipments {
            if !shipment.carrier.requires_credential() {
                candidates.push((shipment, None));
                continue;
            }
            match self.session.credential(&shipment.tracking_code) {
                Some(credential) => candidates.push((shipment, Some(credential))),
                None => {
                    debug!(
                        "Skipping #{} ({}): no credential in this session",
                        shipment.id, shipment.tracking_code
                    );
                    report.skipped += 1;
                }
            }
        }
        report.attempted = candidates.len();

        let results: Vec<_> = stream::iter(candidates)
            .map(|(shipment, credential)| async move {
                let result = self.refresh_with(shipment.id, credential).await;
                (shipment, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (shipment, result) in results {
            match result {
                Ok(outcome) if outcome.changed => report.changed += 1,
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        "Refresh of #{} ({} {}) failed: {}",
                        shipment.id, shipment.carrier, shipment.tracking_code, error
                    );
                    report.failures.push(RefreshFailure {
                        shipment_id: shipment.id,
                        tracking_code: shipment.tracking_code,
                        error,
                    });
                }
            }
        }

        info!(
            "Refreshed {} shipments: {} changed, {} failed, {} skipped",
            report.attempted,
            report.changed,
            report.failures.len(),
            report.skipped
        );
        Ok(report)
    }

    pub fn list(&self) -> Result<Vec<Shipment>> {
        self.store.list()
    }

    pub fn get(&self, id: i64) -> Result<Shipment> {
        self.store.get(id)
    }

    /// Finds a shipment by numeric id or, failing that, by tracking code.
    pub fn lookup(&self, key: &str) -> Result<Option<Shipment>> {
        let key = key.trim();
        if let Ok(id) = key.parse::<i64>() {
            match self.store.get(id) {
                Ok(shipment) => return Ok(Some(shipment)),
                Err(ShipTrackError::ShipmentNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.store.get_by_code(key)
    }

    pub fn history(&self, id: i64) -> Result<Vec<StatusLogEntry>> {
        self.store.history(id)
    }

    /// Deletes a shipment, its history and any credential held for it.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let shipment = match self.store.get(id) {
            Ok(shipment) => shipment,
            Err(ShipTrackError::ShipmentNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let deleted = self.store.delete(id)?;
        self.session.forget(&shipment.tracking_code);
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(deleted)
    }

    /// Applies direct edits. A new `credential` replaces the session's
    /// credential for the shipment; a changed tracking code carries the
    /// existing credential along.
    pub async fn edit(
        &self,
        id: i64,
        edit: ShipmentEdit,
        credential: Option<String>,
    ) -> Result<Shipment> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let before = self.store.get(id)?;
        let credential = credential.map(AuxCredential::new);
        if let Some(credential) = &credential {
            let carrier = edit.carrier.unwrap_or(before.carrier);
            AuxCredential::validate_for(carrier, Some(credential))?;
        }

        let after = self.store.edit(id, &edit)?;
        self.session
            .rename(&before.tracking_code, &after.tracking_code);
        if let Some(credential) = credential {
            self.session.remember(&after.tracking_code, credential);
        }
        Ok(after)
    }

    async fn fetch_unified(
        &self,
        carrier: Carrier,
        tracking_code: &str,
        credential: Option<&AuxCredential>,
    ) -> Result<UnifiedEvent> {
        let source = self.carriers.get(carrier).ok_or_else(|| {
            CarrierError::unavailable(
                carrier,
                UnavailableCause::NotConfigured("no adapter registered".to_string()),
            )
        })?;

        let vendor = tokio::time::timeout(self.timeout, source.fetch(tracking_code, credential))
            .await
            .map_err(|_| CarrierError::unavailable(carrier, UnavailableCause::Timeout(self.timeout)))??;

        if StatusMapper::lookup(carrier, &vendor.code).is_none() {
            debug!(
                "Unmapped {} status '{}' for {}; using {}",
                carrier,
                vendor.code,
                tracking_code,
                StatusMapper::fallback(&vendor.code, &vendor.text)
            );
        }
        Ok(normalize(carrier, tracking_code, vendor))
    }

    fn lock_for(&self, id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id).or_default())
    }
}
