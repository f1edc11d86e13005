//! Shipment repository: CRUD over the `shipments` table.
//!
//! Functions take a `&Connection` so callers can compose them inside a
//! single transaction via [`super::Database::with_transaction`].

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

/// A raw shipment row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentRow {
    pub id: i64,
    pub label: String,
    pub carrier: String,
    pub tracking_code: String,
    pub last_status_code: String,
    pub last_status_text: String,
    pub last_checkpoint_time: String,
    pub last_location: Option<String>,
    pub auto_poll: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ShipmentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            label: row.get("label")?,
            carrier: row.get("carrier")?,
            tracking_code: row.get("tracking_code")?,
            last_status_code: row.get("last_status_code")?,
            last_status_text: row.get("last_status_text")?,
            last_checkpoint_time: row.get("last_checkpoint_time")?,
            last_location: row.get("last_location")?,
            auto_poll: row.get("auto_poll")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Status columns written together by a refresh.
#[derive(Debug, Clone)]
pub struct StatusColumns<'a> {
    pub code: &'a str,
    pub text: &'a str,
    pub checkpoint_time: &'a str,
    pub location: Option<&'a str>,
}

/// Inserts a shipment unless its tracking code is already present.
///
/// Returns the new row id, or `None` when the insert was ignored because of
/// the `tracking_code` uniqueness constraint. `row.id` is not used.
pub fn insert_or_ignore(conn: &Connection, row: &ShipmentRow) -> Result<Option<i64>, DatabaseError> {
    let inserted = conn.execute(
        "INSERT INTO shipments (label, carrier, tracking_code, last_status_code,
         last_status_text, last_checkpoint_time, last_location, auto_poll, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT (tracking_code) DO NOTHING",
        params![
            row.label,
            row.carrier,
            row.tracking_code,
            row.last_status_code,
            row.last_status_text,
            row.last_checkpoint_time,
            row.last_location,
            row.auto_poll,
            row.created_at,
            row.updated_at,
        ],
    )?;

    if inserted == 0 {
        Ok(None)
    } else {
        Ok(Some(conn.last_insert_rowid()))
    }
}

/// Finds a shipment by its id.
pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<ShipmentRow>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT * FROM shipments WHERE id = ?1",
            params![id],
            ShipmentRow::from_row,
        )
        .optional()?)
}

/// Finds a shipment by its tracking code.
pub fn find_by_code(conn: &Connection, code: &str) -> Result<Option<ShipmentRow>, DatabaseError> {
    Ok(conn
        .query_row(
            "SELECT * FROM shipments WHERE tracking_code = ?1",
            params![code],
            ShipmentRow::from_row,
        )
        .optional()?)
}

/// Lists shipments, most recently updated first.
pub fn list(conn: &Connection, auto_poll_only: bool) -> Result<Vec<ShipmentRow>, DatabaseError> {
    let sql = if auto_poll_only {
        "SELECT * FROM shipments WHERE auto_poll = 1 ORDER BY updated_at DESC, id DESC"
    } else {
        "SELECT * FROM shipments ORDER BY updated_at DESC, id DESC"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], ShipmentRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Overwrites the last-status columns and bumps `updated_at`.
pub fn update_status(
    conn: &Connection,
    id: i64,
    status: &StatusColumns<'_>,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE shipments SET last_status_code = ?2, last_status_text = ?3,
         last_checkpoint_time = ?4, last_location = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            id,
            status.code,
            status.text,
            status.checkpoint_time,
            status.location,
            updated_at,
        ],
    )?;
    Ok(())
}

/// Overwrites the user-editable columns and bumps `updated_at`.
pub fn update_details(conn: &Connection, row: &ShipmentRow) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE shipments SET label = ?2, carrier = ?3, tracking_code = ?4,
         auto_poll = ?5, updated_at = ?6
         WHERE id = ?1",
        params![
            row.id,
            row.label,
            row.carrier,
            row.tracking_code,
            row.auto_poll,
            row.updated_at,
        ],
    )?;
    Ok(())
}

/// Deletes a shipment. Status logs go with it via `ON DELETE CASCADE`.
/// Returns whether a row was removed.
pub fn delete(conn: &Connection, id: i64) -> Result<bool, DatabaseError> {
    let count = conn.execute("DELETE FROM shipments WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Counts all shipments.
pub fn count(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row("SELECT COUNT(*) FROM shipments", [], |r| r.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_row(code: &str) -> ShipmentRow {
        ShipmentRow {
            id: 0,
            label: "Áo thun xanh".to_string(),
            carrier: "ghn".to_string(),
            tracking_code: code.to_string(),
            last_status_code: "IN_TRANSIT".to_string(),
            last_status_text: "Đang luân chuyển".to_string(),
            last_checkpoint_time: "2026-01-01T00:00:00.000000+00:00".to_string(),
            last_location: Some("Kho HCM".to_string()),
            auto_poll: true,
            created_at: "2026-01-01T00:00:00.000000+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00.000000+00:00".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        db.with_conn(|conn| {
            let id = insert_or_ignore(conn, &sample_row("GY1"))?.expect("inserted");
            let found = find_by_id(conn, id)?.expect("row exists");
            assert_eq!(found.tracking_code, "GY1");
            assert_eq!(found.last_location.as_deref(), Some("Kho HCM"));
            assert!(found.auto_poll);

            let by_code = find_by_code(conn, "GY1")?.expect("row exists");
            assert_eq!(by_code.id, id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_insert_duplicate_is_ignored() {
        let db = test_db();
        db.with_conn(|conn| {
            assert!(insert_or_ignore(conn, &sample_row("GY2"))?.is_some());
            let mut again = sample_row("GY2");
            again.label = "other".to_string();
            assert!(insert_or_ignore(conn, &again)?.is_none());
            assert_eq!(count(conn)?, 1);
            assert_eq!(find_by_code(conn, "GY2")?.unwrap().label, "Áo thun xanh");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        db.with_conn(|conn| {
            assert!(find_by_id(conn, 42)?.is_none());
            assert!(find_by_code(conn, "missing")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_orders_by_updated_at() {
        let db = test_db();
        db.with_conn(|conn| {
            for (i, code) in ["A", "B", "C"].iter().enumerate() {
                let mut row = sample_row(code);
                row.updated_at = format!("2026-01-0{}T00:00:00.000000+00:00", i + 1);
                row.auto_poll = *code != "B";
                insert_or_ignore(conn, &row)?;
            }

            let all: Vec<String> = list(conn, false)?
                .into_iter()
                .map(|r| r.tracking_code)
                .collect();
            assert_eq!(all, vec!["C", "B", "A"]);

            let polled: Vec<String> = list(conn, true)?
                .into_iter()
                .map(|r| r.tracking_code)
                .collect();
            assert_eq!(polled, vec!["C", "A"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_status() {
        let db = test_db();
        db.with_conn(|conn| {
            let id = insert_or_ignore(conn, &sample_row("U1"))?.unwrap();
            update_status(
                conn,
                id,
                &StatusColumns {
                    code: "DELIVERED",
                    text: "Giao hàng thành công",
                    checkpoint_time: "2026-01-02T00:00:00.000000+00:00",
                    location: None,
                },
                "2026-01-02T00:00:01.000000+00:00",
            )?;
            let found = find_by_id(conn, id)?.unwrap();
            assert_eq!(found.last_status_code, "DELIVERED");
            assert_eq!(found.last_location, None);
            assert_eq!(found.updated_at, "2026-01-02T00:00:01.000000+00:00");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete() {
        let db = test_db();
        db.with_conn(|conn| {
            let id = insert_or_ignore(conn, &sample_row("D1"))?.unwrap();
            assert!(delete(conn, id)?);
            assert!(!delete(conn, id)?);
            assert_eq!(count(conn)?, 0);
            Ok(())
        })
        .unwrap();
    }
}
