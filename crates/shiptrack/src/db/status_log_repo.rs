//! Status log repository: append-only history of the `status_logs` table.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;

/// A raw status log row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLogRow {
    pub id: i64,
    pub shipment_id: i64,
    pub status_code: String,
    pub status_text: String,
    pub checkpoint_time: String,
    pub location: Option<String>,
    pub raw_payload: String,
    pub recorded_at: String,
}

impl StatusLogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            shipment_id: row.get("shipment_id")?,
            status_code: row.get("status_code")?,
            status_text: row.get("status_text")?,
            checkpoint_time: row.get("checkpoint_time")?,
            location: row.get("location")?,
            raw_payload: row.get("raw_payload")?,
            recorded_at: row.get("recorded_at")?,
        })
    }
}

/// Appends a status log entry. `row.id` is not used.
pub fn append(conn: &Connection, row: &StatusLogRow) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO status_logs (shipment_id, status_code, status_text, checkpoint_time,
         location, raw_payload, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            row.shipment_id,
            row.status_code,
            row.status_text,
            row.checkpoint_time,
            row.location,
            row.raw_payload,
            row.recorded_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns the history of one shipment, oldest first.
pub fn find_by_shipment(
    conn: &Connection,
    shipment_id: i64,
) -> Result<Vec<StatusLogRow>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM status_logs WHERE shipment_id = ?1 ORDER BY id ASC")?;
    let rows = stmt
        .query_map(params![shipment_id], StatusLogRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Counts history entries for a shipment.
pub fn count_by_shipment(conn: &Connection, shipment_id: i64) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM status_logs WHERE shipment_id = ?1",
        params![shipment_id],
        |r| r.get(0),
    )?;
    Ok(count)
}
