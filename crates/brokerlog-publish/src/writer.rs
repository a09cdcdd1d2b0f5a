//! Publish persistence writer.
//!
//! [`PublishWriter::log_publish`] turns one broker publish into one
//! `broker_logs` row. A failed insert is retried exactly once as an
//! `error`-status marker row; if that fails too, the failure goes to the
//! text log and is otherwise dropped. Nothing is ever returned as an error.

use std::sync::Arc;

use brokerlog_db::DbPool;
use brokerlog_textlog::AuditLog;
use brokerlog_types::{ClientInfo, QoS};
use chrono::Utc;
use serde_json::{json, Value};

use crate::classify::classify;
use crate::error::PublishError;
use crate::payload::{build_meta, parse_payload};
use crate::record::{LogRecord, Status};
use crate::store::insert_record;

/// Payload stored in place of the message when the primary insert failed.
pub const FALLBACK_PAYLOAD_ERROR: &str = "Failed to parse or store message";

/// What happened to one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `$SYS` topic, nothing recorded.
    Skipped,
    /// The full record was stored under this row id.
    Stored(i64),
    /// The primary insert failed; the error marker row has this id.
    Fallback(i64),
    /// Both inserts failed; only a text log line remains.
    Dropped,
}

/// Writes publish records through a connection pool.
///
/// Each insert checks a connection out of the pool and returns it before
/// the next step, so no connection is held while waiting on anything else.
#[derive(Clone)]
pub struct PublishWriter {
    pool: DbPool,
    audit: Arc<AuditLog>,
}

impl PublishWriter {
    /// Creates a writer over `pool`, reporting double failures to `audit`.
    pub fn new(pool: DbPool, audit: Arc<AuditLog>) -> Self {
        Self { pool, audit }
    }

    /// The pool records are written through.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Records one publish. Blocking; never fails.
    pub fn log_publish(
        &self,
        client_id: &str,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        client: &ClientInfo,
    ) -> WriteOutcome {
        let Some(class) = classify(topic) else {
            return WriteOutcome::Skipped;
        };

        let parsed = parse_payload(payload);
        let received_at = Utc::now();
        let meta = build_meta(qos, client, payload.len(), received_at, &parsed);

        let record = LogRecord {
            ts: received_at,
            device_id: class.device_id,
            client_id: client_id.to_string(),
            direction: class.direction,
            topic: topic.to_string(),
            msg_type: class.msg_type,
            status: Status::Success,
            payload: parsed,
            meta,
        };

        let primary_err = match self.insert(&record) {
            Ok(id) => return WriteOutcome::Stored(id),
            Err(e) => e,
        };

        tracing::warn!(
            client_id,
            topic,
            error = %primary_err,
            "failed to store publish record, writing error marker"
        );

        let fallback = fallback_record(record, &primary_err);
        match self.insert(&fallback) {
            Ok(id) => WriteOutcome::Fallback(id),
            Err(fallback_err) => {
                tracing::error!(
                    client_id,
                    topic,
                    error = %fallback_err,
                    "failed to store publish error marker"
                );
                self.audit.error(
                    &format!("Failed to store publish log: {topic}"),
                    &format!("{primary_err}; fallback: {fallback_err}"),
                    Some(client_id),
                );
                WriteOutcome::Dropped
            }
        }
    }

    fn insert(&self, record: &LogRecord) -> Result<i64, PublishError> {
        let conn = self.pool.get()?;
        insert_record(&conn, record)
    }
}

fn fallback_record(mut record: LogRecord, cause: &PublishError) -> LogRecord {
    let mut meta = match record.meta {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    meta.insert("error".to_string(), json!(cause.to_string()));

    record.ts = Utc::now();
    record.status = Status::Error;
    record.payload = json!({ "error": FALLBACK_PAYLOAD_ERROR });
    record.meta = Value::Object(meta);
    record
}
