//! Persistence operations for the `broker_logs` table.
//!
//! Writes go through [`insert_record`]; reads go through [`query_records`],
//! which supports filtering by device, client, message type, status and
//! time range.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};

use crate::error::PublishError;
use crate::record::{LogRecord, MsgType, Status, StoredRecord};

/// Inserts one record and returns its row id.
///
/// # Errors
///
/// Returns `PublishError::Database` on SQL failure or
/// `PublishError::Serialization` if a JSON column cannot be serialised.
pub fn insert_record(conn: &Connection, record: &LogRecord) -> Result<i64, PublishError> {
    let payload = serde_json::to_string(&record.payload)?;
    let meta = serde_json::to_string(&record.meta)?;

    conn.execute(
        "INSERT INTO broker_logs
            (ts, device_id, client_id, direction, topic, msg_type, status, payload, meta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            format_ts(record.ts),
            record.device_id,
            record.client_id,
            record.direction.as_str(),
            record.topic,
            record.msg_type.as_str(),
            record.status.as_str(),
            payload,
            meta,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Filter parameters for [`query_records`].
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Filter by device id.
    pub device_id: Option<String>,
    /// Filter by publishing client.
    pub client_id: Option<String>,
    /// Filter by message type.
    pub msg_type: Option<MsgType>,
    /// Filter by storage status.
    pub status: Option<Status>,
    /// Records captured at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Records captured strictly before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Maximum number of records to return (default: 100).
    pub limit: Option<i64>,
}

/// Queries stored records, newest first.
///
/// # Errors
///
/// Returns `PublishError::Database` on SQL failure, or
/// `PublishError::InvalidColumn` / `PublishError::Serialization` if a
/// stored row cannot be decoded.
pub fn query_records(
    conn: &Connection,
    filter: &RecordFilter,
) -> Result<Vec<StoredRecord>, PublishError> {
    // Collect WHERE clauses and bind parameters separately so nothing is
    // interpolated.
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(ref device_id) = filter.device_id {
        clauses.push(format!("device_id = ?{idx}"));
        param_values.push(Box::new(device_id.clone()));
        idx += 1;
    }

    if let Some(ref client_id) = filter.client_id {
        clauses.push(format!("client_id = ?{idx}"));
        param_values.push(Box::new(client_id.clone()));
        idx += 1;
    }

    if let Some(msg_type) = filter.msg_type {
        clauses.push(format!("msg_type = ?{idx}"));
        param_values.push(Box::new(msg_type.as_str()));
        idx += 1;
    }

    if let Some(status) = filter.status {
        clauses.push(format!("status = ?{idx}"));
        param_values.push(Box::new(status.as_str()));
        idx += 1;
    }

    if let Some(since) = filter.since {
        clauses.push(format!("ts >= ?{idx}"));
        param_values.push(Box::new(format_ts(since)));
        idx += 1;
    }

    if let Some(until) = filter.until {
        clauses.push(format!("ts < ?{idx}"));
        param_values.push(Box::new(format_ts(until)));
        idx += 1;
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, ts, device_id, client_id, direction, topic, msg_type, status, payload, meta
         FROM broker_logs
         {where_clause}
         ORDER BY ts DESC, id DESC
         LIMIT ?{idx}"
    );
    param_values.push(Box::new(filter.limit.unwrap_or(100)));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok(RawRow {
            id: row.get(0)?,
            ts: row.get(1)?,
            device_id: row.get(2)?,
            client_id: row.get(3)?,
            direction: row.get(4)?,
            topic: row.get(5)?,
            msg_type: row.get(6)?,
            status: row.get(7)?,
            payload: row.get(8)?,
            meta: row.get(9)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.decode()?);
    }

    Ok(records)
}

/// Counts stored records, optionally restricted to one status.
///
/// # Errors
///
/// Returns `PublishError::Database` on SQL failure.
pub fn count_records(conn: &Connection, status: Option<Status>) -> Result<i64, PublishError> {
    let count = match status {
        Some(status) => conn.query_row(
            "SELECT COUNT(*) FROM broker_logs WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM broker_logs", [], |row| row.get(0))?,
    };
    Ok(count)
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

struct RawRow {
    id: i64,
    ts: String,
    device_id: Option<String>,
    client_id: String,
    direction: String,
    topic: String,
    msg_type: String,
    status: String,
    payload: String,
    meta: String,
}

impl RawRow {
    fn decode(self) -> Result<StoredRecord, PublishError> {
        let invalid = |e: &dyn std::fmt::Display| PublishError::InvalidColumn(e.to_string());

        let ts = DateTime::parse_from_rfc3339(&self.ts)
            .map_err(|e| invalid(&e))?
            .with_timezone(&Utc);

        Ok(StoredRecord {
            id: self.id,
            record: LogRecord {
                ts,
                device_id: self.device_id,
                client_id: self.client_id,
                direction: self.direction.parse().map_err(|e| invalid(&e))?,
                topic: self.topic,
                msg_type: self.msg_type.parse().map_err(|e| invalid(&e))?,
                status: self.status.parse().map_err(|e| invalid(&e))?,
                payload: serde_json::from_str(&self.payload)?,
                meta: serde_json::from_str(&self.meta)?,
            },
        })
    }
}
