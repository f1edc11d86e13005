//! Shipment store: typed, change-aware access to the `shipments` and
//! `status_logs` tables.
//!
//! Every mutation runs in one SQLite transaction, so a status update and its
//! history row commit together or not at all. The compare in
//! [`ShipmentStore::update_from_unified`] happens inside the same transaction
//! as the write.

use chrono::Utc;
use log::{debug, info};

use crate::config::{DatabaseConfig, DuplicatePolicy};
use crate::db::shipment_repo::{self, ShipmentRow, StatusColumns};
use crate::db::status_log_repo::{self, StatusLogRow};
use crate::db::{format_timestamp, parse_timestamp, Database, DatabaseError};
use crate::error::{Result, ShipTrackError};
use crate::model::{
    Carrier, LastStatus, Shipment, ShipmentEdit, StatusLogEntry, UnifiedEvent, UnifiedStatus,
};

/// Label stored when the user gives none.
pub const DEFAULT_LABEL: &str = "(Không tên)";

/// Result of [`ShipmentStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(Shipment),
    /// The tracking code was already stored; the existing row is returned
    /// unchanged.
    AlreadyTracked(Shipment),
}

impl CreateOutcome {
    pub fn shipment(&self) -> &Shipment {
        match self {
            CreateOutcome::Created(s) | CreateOutcome::AlreadyTracked(s) => s,
        }
    }

    pub fn into_shipment(self) -> Shipment {
        match self {
            CreateOutcome::Created(s) | CreateOutcome::AlreadyTracked(s) => s,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

#[derive(Clone)]
pub struct ShipmentStore {
    db: Database,
    record_history: bool,
    duplicate_policy: DuplicatePolicy,
}

impl ShipmentStore {
    pub fn new(db: Database, config: &DatabaseConfig) -> Self {
        Self {
            db,
            record_history: config.record_history,
            duplicate_policy: config.duplicate_policy,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn records_history(&self) -> bool {
        self.record_history
    }

    /// Stores a new shipment whose first status is `event`.
    ///
    /// A tracking code that is already stored is resolved by the configured
    /// [`DuplicatePolicy`]: `Ignore` returns the existing shipment untouched,
    /// `Reject` fails with `DuplicateTrackingCode`.
    pub fn create(
        &self,
        label: &str,
        carrier: Carrier,
        tracking_code: &str,
        event: &UnifiedEvent,
    ) -> Result<CreateOutcome> {
        let tracking_code = tracking_code.trim();
        if tracking_code.is_empty() {
            return Err(ShipTrackError::InvalidInput(
                "tracking code must not be empty".to_string(),
            ));
        }

        let label = match label.trim() {
            "" => DEFAULT_LABEL,
            trimmed => trimmed,
        };
        let now = format_timestamp(&Utc::now());
        let checkpoint_time = format_timestamp(&event.time);
        let record_history = self.record_history;
        let policy = self.duplicate_policy;

        let outcome = self.db.with_transaction(|conn| {
            let row = ShipmentRow {
                id: 0,
                label: label.to_string(),
                carrier: carrier.as_str().to_string(),
                tracking_code: tracking_code.to_string(),
                last_status_code: event.code.as_str().to_string(),
                last_status_text: event.text.clone(),
                last_checkpoint_time: checkpoint_time.clone(),
                last_location: event.location.clone(),
                auto_poll: true,
                created_at: now.clone(),
                updated_at: now.clone(),
            };

            match shipment_repo::insert_or_ignore(conn, &row)? {
                Some(id) => {
                    if record_history {
                        status_log_repo::append(conn, &log_row(id, event, &now)?)?;
                    }
                    let stored = shipment_repo::find_by_id(conn, id)?
                        .ok_or_else(|| missing_after_write(id))?;
                    Ok(CreateOutcome::Created(shipment_from_row(stored)?))
                }
                None => match policy {
                    DuplicatePolicy::Reject => {
                        Err(DatabaseError::DuplicateTrackingCode(tracking_code.to_string()))
                    }
                    DuplicatePolicy::Ignore => {
                        let existing = shipment_repo::find_by_code(conn, tracking_code)?
                            .ok_or_else(|| {
                                DatabaseError::DuplicateTrackingCode(tracking_code.to_string())
                            })?;
                        Ok(CreateOutcome::AlreadyTracked(shipment_from_row(existing)?))
                    }
                },
            }
        })?;

        match &outcome {
            CreateOutcome::Created(s) => info!(
                "Tracking {} shipment {} as #{} ({})",
                s.carrier, s.tracking_code, s.id, s.last_status.code
            ),
            CreateOutcome::AlreadyTracked(s) => debug!(
                "Shipment {} is already tracked as #{}",
                s.tracking_code, s.id
            ),
        }

        Ok(outcome)
    }

    /// Compares `event` field-wise against the stored last status. When any of
    /// code, text, time, or location differs the new status is written,
    /// `updated_at` is bumped, a history row is appended (if enabled) and
    /// `true` is returned. Otherwise nothing is written.
    pub fn update_from_unified(&self, id: i64, event: &UnifiedEvent) -> Result<bool> {
        let record_history = self.record_history;

        let changed = self.db.with_transaction(|conn| {
            let Some(row) = shipment_repo::find_by_id(conn, id)? else {
                return Ok(None);
            };
            let before = last_status_from_row(&row)?;
            if !before.differs_from(event) {
                return Ok(Some(false));
            }

            let now = format_timestamp(&Utc::now());
            let checkpoint_time = format_timestamp(&event.time);
            shipment_repo::update_status(
                conn,
                id,
                &StatusColumns {
                    code: event.code.as_str(),
                    text: &event.text,
                    checkpoint_time: &checkpoint_time,
                    location: event.location.as_deref(),
                },
                &now,
            )?;
            if record_history {
                status_log_repo::append(conn, &log_row(id, event, &now)?)?;
            }
            Ok(Some(true))
        })?;

        changed.ok_or(ShipTrackError::ShipmentNotFound(id))
    }

    /// All shipments, most recently updated first.
    pub fn list(&self) -> Result<Vec<Shipment>> {
        self.list_filtered(false)
    }

    /// Shipments included in scheduled refreshes, most recently updated first.
    pub fn list_auto_poll(&self) -> Result<Vec<Shipment>> {
        self.list_filtered(true)
    }

    fn list_filtered(&self, auto_poll_only: bool) -> Result<Vec<Shipment>> {
        let shipments = self.db.with_conn(|conn| {
            shipment_repo::list(conn, auto_poll_only)?
                .into_iter()
                .map(shipment_from_row)
                .collect::<std::result::Result<Vec<_>, _>>()
        })?;
        Ok(shipments)
    }

    pub fn get(&self, id: i64) -> Result<Shipment> {
        let row = self.db.with_conn(|conn| shipment_repo::find_by_id(conn, id))?;
        match row {
            Some(row) => Ok(shipment_from_row(row)?),
            None => Err(ShipTrackError::ShipmentNotFound(id)),
        }
    }

    pub fn get_by_code(&self, tracking_code: &str) -> Result<Option<Shipment>> {
        let row = self
            .db
            .with_conn(|conn| shipment_repo::find_by_code(conn, tracking_code.trim()))?;
        Ok(row.map(shipment_from_row).transpose()?)
    }

    /// Deletes a shipment and its history. Returns whether it existed.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let deleted = self.db.with_transaction(|conn| shipment_repo::delete(conn, id))?;
        if deleted {
            info!("Deleted shipment #{}", id);
        }
        Ok(deleted)
    }

    /// Applies direct edits. The status is left as is; an empty edit is a
    /// no-op that does not bump `updated_at`.
    pub fn edit(&self, id: i64, edit: &ShipmentEdit) -> Result<Shipment> {
        if let Some(code) = &edit.tracking_code {
            if code.trim().is_empty() {
                return Err(ShipTrackError::InvalidInput(
                    "tracking code must not be empty".to_string(),
                ));
            }
        }
        if edit.is_empty() {
            return self.get(id);
        }

        let row = self.db.with_transaction(|conn| {
            let Some(mut row) = shipment_repo::find_by_id(conn, id)? else {
                return Ok(None);
            };

            if let Some(code) = &edit.tracking_code {
                let code = code.trim();
                if let Some(other) = shipment_repo::find_by_code(conn, code)? {
                    if other.id != id {
                        return Err(DatabaseError::DuplicateTrackingCode(code.to_string()));
                    }
                }
                row.tracking_code = code.to_string();
            }
            if let Some(label) = &edit.label {
                row.label = match label.trim() {
                    "" => DEFAULT_LABEL.to_string(),
                    trimmed => trimmed.to_string(),
                };
            }
            if let Some(carrier) = edit.carrier {
                row.carrier = carrier.as_str().to_string();
            }
            if let Some(auto_poll) = edit.auto_poll {
                row.auto_poll = auto_poll;
            }
            row.updated_at = format_timestamp(&Utc::now());

            shipment_repo::update_details(conn, &row)?;
            Ok(Some(row))
        })?;

        match row {
            Some(row) => Ok(shipment_from_row(row)?),
            None => Err(ShipTrackError::ShipmentNotFound(id)),
        }
    }

    /// Recorded status changes for a shipment, oldest first.
    pub fn history(&self, id: i64) -> Result<Vec<StatusLogEntry>> {
        let entries = self.db.with_conn(|conn| {
            if shipment_repo::find_by_id(conn, id)?.is_none() {
                return Ok(None);
            }
            status_log_repo::find_by_shipment(conn, id)?
                .into_iter()
                .map(log_entry_from_row)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Some)
        })?;
        entries.ok_or(ShipTrackError::ShipmentNotFound(id))
    }
}

fn missing_after_write(id: i64) -> DatabaseError {
    DatabaseError::InvalidRow {
        column: "id",
        reason: format!("shipment #{} vanished inside its own transaction", id),
    }
}

fn log_row(
    shipment_id: i64,
    event: &UnifiedEvent,
    recorded_at: &str,
) -> std::result::Result<StatusLogRow, DatabaseError> {
    let raw_payload = serde_json::to_string(&event.raw).map_err(|e| DatabaseError::InvalidRow {
        column: "raw_payload",
        reason: e.to_string(),
    })?;

    Ok(StatusLogRow {
        id: 0,
        shipment_id,
        status_code: event.code.as_str().to_string(),
        status_text: event.text.clone(),
        checkpoint_time: format_timestamp(&event.time),
        location: event.location.clone(),
        raw_payload,
        recorded_at: recorded_at.to_string(),
    })
}

fn parse_status(column: &'static str, value: &str) -> std::result::Result<UnifiedStatus, DatabaseError> {
    value
        .parse()
        .map_err(|reason| DatabaseError::InvalidRow { column, reason })
}

fn last_status_from_row(row: &ShipmentRow) -> std::result::Result<LastStatus, DatabaseError> {
    Ok(LastStatus {
        code: parse_status("last_status_code", &row.last_status_code)?,
        text: row.last_status_text.clone(),
        time: parse_timestamp("last_checkpoint_time", &row.last_checkpoint_time)?,
        location: row.last_location.clone(),
    })
}

fn shipment_from_row(row: ShipmentRow) -> std::result::Result<Shipment, DatabaseError> {
    let carrier: Carrier = row.carrier.parse().map_err(|e: ShipTrackError| {
        DatabaseError::InvalidRow {
            column: "carrier",
            reason: e.to_string(),
        }
    })?;

    Ok(Shipment {
        last_status: last_status_from_row(&row)?,
        id: row.id,
        carrier,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
        label: row.label,
        tracking_code: row.tracking_code,
        auto_poll: row.auto_poll,
    })
}

fn log_entry_from_row(row: StatusLogRow) -> std::result::Result<StatusLogEntry, DatabaseError> {
    Ok(StatusLogEntry {
        id: row.id,
        shipment_id: row.shipment_id,
        status: LastStatus {
            code: parse_status("status_code", &row.status_code)?,
            text: row.status_text,
            time: parse_timestamp("checkpoint_time", &row.checkpoint_time)?,
            location: row.location,
        },
        recorded_at: parse_timestamp("recorded_at", &row.recorded_at)?,
        raw_payload: row.raw_payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VendorEvent;
    use chrono::{DateTime, TimeZone};

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 24, 1, 30, 0).unwrap()
    }

    fn event(code: UnifiedStatus, text: &str, location: Option<&str>) -> UnifiedEvent {
        UnifiedEvent {
            code,
            text: text.to_string(),
            location: location.map(str::to_string),
            time: t1(),
            raw: VendorEvent {
                code: "vendor".to_string(),
                text: text.to_string(),
                location: location.unwrap_or_default().to_string(),
                time: t1(),
            },
        }
    }

    fn store_with(config: DatabaseConfig) -> ShipmentStore {
        ShipmentStore::new(Database::open_in_memory().unwrap(), &config)
    }

    fn store() -> ShipmentStore {
        store_with(DatabaseConfig::default())
    }

    fn in_transit() -> UnifiedEvent {
        event(UnifiedStatus::InTransit, "Đang trung chuyển", Some("Kho HCM"))
    }

    #[test]
    fn test_create_then_list_delivered() {
        let store = store();
        let delivered = event(UnifiedStatus::Delivered, "Giao hàng thành công", None);
        let outcome = store
            .create("Sách", Carrier::Ghn, "GYVBHWD7", &delivered)
            .unwrap();
        assert!(outcome.is_created());

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_status.code, UnifiedStatus::Delivered);
        assert_eq!(all[0].last_status.code.as_str(), "DELIVERED");
        assert_eq!(all[0].last_status.time, t1());
        assert!(all[0].auto_poll);
    }

    #[test]
    fn test_duplicate_create_is_ignored_by_default() {
        let store = store();
        let first = store.create("A", Carrier::Spx, "SPX1", &in_transit()).unwrap();
        let second = store
            .create("B", Carrier::Spx, "SPX1", &event(UnifiedStatus::Delivered, "x", None))
            .unwrap();

        assert!(!second.is_created());
        assert_eq!(second.shipment(), first.shipment());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_create_rejected_by_policy() {
        let store = store_with(DatabaseConfig {
            duplicate_policy: DuplicatePolicy::Reject,
            ..Default::default()
        });
        store.create("A", Carrier::Spx, "SPX1", &in_transit()).unwrap();
        let err = store.create("A", Carrier::Spx, "SPX1", &in_transit()).unwrap_err();
        assert!(matches!(
            err,
            ShipTrackError::Database(DatabaseError::DuplicateTrackingCode(_))
        ));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_label_gets_default() {
        let store = store();
        let s = store
            .create("  ", Carrier::Mock, "M1", &in_transit())
            .unwrap()
            .into_shipment();
        assert_eq!(s.label, DEFAULT_LABEL);
        assert!(store.create("x", Carrier::Mock, " ", &in_transit()).is_err());
    }

    #[test]
    fn test_update_is_idempotent() {
        let store = store();
        let id = store
            .create("A", Carrier::Mock, "M1", &in_transit())
            .unwrap()
            .shipment()
            .id;
        let before = store.get(id).unwrap();

        assert!(!store.update_from_unified(id, &in_transit()).unwrap());
        assert_eq!(store.get(id).unwrap().updated_at, before.updated_at);
        assert_eq!(store.history(id).unwrap().len(), 1);
    }

    #[test]
    fn test_any_field_change_is_detected() {
        let store = store();
        let id = store
            .create("A", Carrier::Mock, "M1", &in_transit())
            .unwrap()
            .shipment()
            .id;

        let mut variants = Vec::new();
        let mut e = in_transit();
        e.code = UnifiedStatus::OutForDelivery;
        variants.push(e);
        let mut e = in_transit();
        e.text = "Đã đến kho".to_string();
        variants.push(e);
        let mut e = in_transit();
        e.time = t1() + chrono::Duration::minutes(5);
        variants.push(e);
        let mut e = in_transit();
        e.location = None;
        variants.push(e);

        for changed in variants {
            // Start each comparison from the same baseline.
            store.update_from_unified(id, &in_transit()).unwrap();
            assert!(store.update_from_unified(id, &changed).unwrap(), "{:?}", changed);
            assert_eq!(store.get(id).unwrap().last_status, LastStatus::from(&changed));
        }
    }

    #[test]
    fn test_update_appends_history_with_raw_payload() {
        let store = store();
        let id = store
            .create("A", Carrier::Mock, "M1", &in_transit())
            .unwrap()
            .shipment()
            .id;
        let delivered = event(UnifiedStatus::Delivered, "Đã giao", Some("Hà Nội"));
        assert!(store.update_from_unified(id, &delivered).unwrap());

        let history = store.history(id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status.code, UnifiedStatus::Delivered);
        let raw: VendorEvent = serde_json::from_str(&history[1].raw_payload).unwrap();
        assert_eq!(raw, delivered.raw);
    }

    #[test]
    fn test_history_can_be_disabled() {
        let store = store_with(DatabaseConfig {
            record_history: false,
            ..Default::default()
        });
        let id = store
            .create("A", Carrier::Mock, "M1", &in_transit())
            .unwrap()
            .shipment()
            .id;
        let delivered = event(UnifiedStatus::Delivered, "Đã giao", None);
        assert!(store.update_from_unified(id, &delivered).unwrap());
        assert!(store.history(id).unwrap().is_empty());
    }

    #[test]
    fn test_update_unknown_shipment() {
        let store = store();
        assert!(matches!(
            store.update_from_unified(7, &in_transit()),
            Err(ShipTrackError::ShipmentNotFound(7))
        ));
    }

    #[test]
    fn test_edit_fields_and_collision() {
        let store = store();
        let a = store.create("A", Carrier::Mock, "M1", &in_transit()).unwrap().into_shipment();
        store.create("B", Carrier::Mock, "M2", &in_transit()).unwrap();

        let edited = store
            .edit(
                a.id,
                &ShipmentEdit {
                    label: Some("Giày".to_string()),
                    carrier: Some(Carrier::Spx),
                    auto_poll: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(edited.label, "Giày");
        assert_eq!(edited.carrier, Carrier::Spx);
        assert!(!edited.auto_poll);
        assert_eq!(edited.last_status, a.last_status);
        assert!(edited.updated_at >= a.updated_at);

        let err = store
            .edit(
                a.id,
                &ShipmentEdit {
                    tracking_code: Some("M2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ShipTrackError::Database(DatabaseError::DuplicateTrackingCode(_))
        ));

        // Keeping its own code is not a collision.
        store
            .edit(
                a.id,
                &ShipmentEdit {
                    tracking_code: Some("M1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.list_auto_poll().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_cascades_history() {
        let store = store();
        let id = store
            .create("A", Carrier::Mock, "M1", &in_transit())
            .unwrap()
            .shipment()
            .id;
        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert!(matches!(store.get(id), Err(ShipTrackError::ShipmentNotFound(_))));
        assert!(matches!(store.history(id), Err(ShipTrackError::ShipmentNotFound(_))));
        assert!(store.get_by_code("M1").unwrap().is_none());
    }
}
