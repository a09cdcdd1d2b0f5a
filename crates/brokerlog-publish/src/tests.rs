//! Tests for the publish writer and record store.

use std::sync::Arc;

use brokerlog_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use brokerlog_textlog::{AuditLog, RotatingLogConfig};
use brokerlog_types::{ClientInfo, QoS, BROKER_CLIENT_ID};
use chrono::{Duration, Utc};
use serde_json::json;
use tempfile::TempDir;

use crate::record::{Direction, MsgType, Status};
use crate::store::{count_records, query_records, RecordFilter};
use crate::writer::{PublishWriter, WriteOutcome, FALLBACK_PAYLOAD_ERROR};

struct Fixture {
    dir: TempDir,
    pool: DbPool,
    audit: Arc<AuditLog>,
    writer: PublishWriter,
}

/// Creates a file-backed pool with migrations applied and a text log in the
/// same temp dir.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let db_path = dir.path().join("broker_logs.db");
    let pool = create_pool(
        db_path.to_str().expect("temp path should be utf-8"),
        DbRuntimeSettings::default(),
    )
    .expect("pool creation should succeed");
    {
        let conn = pool.get().expect("should get a connection");
        run_migrations(&conn).expect("migrations should succeed");
    }

    let audit = Arc::new(AuditLog::open(RotatingLogConfig {
        dir: dir.path().join("logs"),
        ..RotatingLogConfig::default()
    }));
    let writer = PublishWriter::new(pool.clone(), Arc::clone(&audit));

    Fixture {
        dir,
        pool,
        audit,
        writer,
    }
}

fn fail_inserts_when(pool: &DbPool, condition: &str) {
    let conn = pool.get().expect("should get a connection");
    conn.execute_batch(&format!(
        "CREATE TRIGGER simulated_outage BEFORE INSERT ON broker_logs
         WHEN {condition}
         BEGIN SELECT RAISE(ABORT, 'simulated store outage'); END;"
    ))
    .expect("should create failure trigger");
}

fn text_log(fx: &Fixture) -> String {
    let path = fx
        .audit
        .logger()
        .expect("text log should be open")
        .active_path();
    std::fs::read_to_string(path).unwrap_or_default()
}

fn all_records(pool: &DbPool) -> Vec<crate::record::StoredRecord> {
    let conn = pool.get().expect("should get a connection");
    query_records(&conn, &RecordFilter::default()).expect("query should succeed")
}

// ── Successful writes ────────────────────────────────────────────────

#[test]
fn door_command_is_recorded_as_outbound_cmd_open() {
    let fx = fixture();
    let payload = br#"{"ts":1700000000,"v":1,"command":{"lock1":"off"}}"#;

    let outcome = fx.writer.log_publish(
        "dash-1",
        "doorlock/esp-door-01/cmd/open",
        payload,
        QoS::AtLeastOnce,
        &ClientInfo::default(),
    );
    assert!(matches!(outcome, WriteOutcome::Stored(_)), "got {outcome:?}");

    let records = all_records(&fx.pool);
    assert_eq!(records.len(), 1);
    let record = &records[0].record;

    assert_eq!(record.device_id.as_deref(), Some("esp-door-01"));
    assert_eq!(record.client_id, "dash-1");
    assert_eq!(record.msg_type, MsgType::CmdOpen);
    assert_eq!(record.direction, Direction::Out);
    assert_eq!(record.status, Status::Success);
    assert_eq!(record.topic, "doorlock/esp-door-01/cmd/open");
    assert_eq!(
        record.payload,
        json!({"ts": 1700000000, "v": 1, "command": {"lock1": "off"}})
    );
    assert_eq!(record.meta["qos"], 1);
    assert_eq!(record.meta["payload_size"], payload.len());
}

#[test]
fn nested_payload_round_trips_through_the_store() {
    let fx = fixture();
    let original = json!({
        "ts": 1700000123,
        "v": 2,
        "readings": [1.5, -3, null, {"deep": [true, false, "x"]}],
        "meta": {"fw": "2.0.1", "uptime": 86400},
        "unicode": "khoá cửa"
    });
    let payload = serde_json::to_vec(&original).expect("should serialise");

    fx.writer.log_publish(
        "esp-door-01",
        "doorlock/esp-door-01/data",
        &payload,
        QoS::AtMostOnce,
        &ClientInfo::default(),
    );

    let records = all_records(&fx.pool);
    assert_eq!(records[0].record.payload, original);
    assert_eq!(records[0].record.direction, Direction::In);
    assert_eq!(records[0].record.meta["firmware_version"], "2.0.1");
}

#[test]
fn malformed_payload_is_stored_as_success_with_parse_error() {
    let fx = fixture();

    let outcome = fx.writer.log_publish(
        "esp-door-01",
        "doorlock/esp-door-01/event/health",
        b"battery=81%",
        QoS::AtMostOnce,
        &ClientInfo::default(),
    );
    assert!(matches!(outcome, WriteOutcome::Stored(_)));

    let record = &all_records(&fx.pool)[0].record;
    assert_eq!(record.status, Status::Success);
    assert_eq!(record.msg_type, MsgType::Health);
    assert_eq!(record.payload["raw"], "battery=81%");
    assert!(!record.payload["parse_error"]
        .as_str()
        .expect("parse_error should be a string")
        .is_empty());
}

#[test]
fn session_metadata_enriches_meta() {
    let fx = fixture();
    let client = ClientInfo {
        ip: Some("192.168.1.40".to_string()),
        port: Some(61000),
    };

    fx.writer.log_publish(
        "esp-door-01",
        "doorlock/esp-door-01/cmd/response",
        br#"{"ok":true}"#,
        QoS::ExactlyOnce,
        &client,
    );

    let record = &all_records(&fx.pool)[0].record;
    assert_eq!(record.meta["client_ip"], "192.168.1.40");
    assert_eq!(record.meta["client_port"], 61000);
    assert_eq!(record.meta["qos"], 2);
    assert!(record.meta["received_at"].is_string());
}

#[test]
fn unknown_client_gets_empty_session_metadata() {
    let fx = fixture();

    fx.writer.log_publish(
        BROKER_CLIENT_ID,
        "doorlock/esp-door-01/cmd/open",
        b"{}",
        QoS::AtMostOnce,
        &ClientInfo::default(),
    );

    let record = &all_records(&fx.pool)[0].record;
    assert_eq!(record.client_id, "broker");
    assert!(record.meta.get("client_ip").is_none());
    assert!(record.meta.get("client_port").is_none());
}

#[test]
fn single_segment_topic_has_no_device() {
    let fx = fixture();

    fx.writer
        .log_publish("a", "announcements", b"1", QoS::AtMostOnce, &ClientInfo::default());

    let record = &all_records(&fx.pool)[0].record;
    assert_eq!(record.device_id, None);
    assert_eq!(record.msg_type, MsgType::Other);
    assert_eq!(record.direction, Direction::In);
}

#[test]
fn system_topics_produce_no_record() {
    let fx = fixture();

    let outcome = fx.writer.log_publish(
        BROKER_CLIENT_ID,
        "$SYS/broker/clients/total",
        b"3",
        QoS::AtMostOnce,
        &ClientInfo::default(),
    );

    assert_eq!(outcome, WriteOutcome::Skipped);
    let conn = fx.pool.get().expect("should get a connection");
    assert_eq!(count_records(&conn, None).expect("count should succeed"), 0);
}

// ── Failure handling ─────────────────────────────────────────────────

#[test]
fn primary_failure_writes_exactly_one_error_marker() {
    let fx = fixture();
    fail_inserts_when(&fx.pool, "NEW.status = 'success'");

    let outcome = fx.writer.log_publish(
        "dash-1",
        "doorlock/esp-door-01/cmd/open",
        br#"{"command":{"lock1":"on"}}"#,
        QoS::AtLeastOnce,
        &ClientInfo::default(),
    );
    assert!(matches!(outcome, WriteOutcome::Fallback(_)), "got {outcome:?}");

    let records = all_records(&fx.pool);
    assert_eq!(records.len(), 1);
    let record = &records[0].record;
    assert_eq!(record.status, Status::Error);
    assert_eq!(record.payload, json!({ "error": FALLBACK_PAYLOAD_ERROR }));
    assert_eq!(record.device_id.as_deref(), Some("esp-door-01"));
    assert_eq!(record.msg_type, MsgType::CmdOpen);
    assert_eq!(record.meta["qos"], 1);
    assert!(record.meta["error"]
        .as_str()
        .expect("meta.error should be a string")
        .contains("simulated store outage"));
}

#[test]
fn double_failure_leaves_no_row_and_one_text_log_error() {
    let fx = fixture();
    fail_inserts_when(&fx.pool, "1");

    let outcome = fx.writer.log_publish(
        "dash-1",
        "doorlock/esp-door-01/cmd/open",
        b"{}",
        QoS::AtMostOnce,
        &ClientInfo::default(),
    );
    assert_eq!(outcome, WriteOutcome::Dropped);

    let conn = fx.pool.get().expect("should get a connection");
    assert_eq!(count_records(&conn, None).expect("count should succeed"), 0);

    let log = text_log(&fx);
    let errors: Vec<&str> = log.lines().filter(|l| l.contains("[ERROR]")).collect();
    assert_eq!(errors.len(), 1, "log was: {log}");
    assert!(errors[0].contains("doorlock/esp-door-01/cmd/open"));
    assert!(errors[0].contains("simulated store outage"));
    assert!(fx.dir.path().join("logs").is_dir());
}

#[test]
fn missing_table_is_absorbed() {
    let fx = fixture();
    {
        let conn = fx.pool.get().expect("should get a connection");
        conn.execute_batch("DROP TABLE broker_logs;")
            .expect("should drop table");
    }

    let outcome = fx.writer.log_publish(
        "dash-1",
        "doorlock/esp-door-01/data",
        b"{}",
        QoS::AtMostOnce,
        &ClientInfo::default(),
    );
    assert_eq!(outcome, WriteOutcome::Dropped);
}

// ── Queries ──────────────────────────────────────────────────────────

#[test]
fn query_filters_by_device_type_and_status() {
    let fx = fixture();
    let none = ClientInfo::default();

    fx.writer
        .log_publish("d1", "doorlock/d1/event/health", b"{}", QoS::AtMostOnce, &none);
    fx.writer
        .log_publish("dash-1", "doorlock/d1/cmd/open", b"{}", QoS::AtLeastOnce, &none);
    fx.writer
        .log_publish("d2", "doorlock/d2/event/health", b"{}", QoS::AtMostOnce, &none);

    let conn = fx.pool.get().expect("should get a connection");

    let d1 = query_records(
        &conn,
        &RecordFilter {
            device_id: Some("d1".to_string()),
            ..RecordFilter::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(d1.len(), 2);

    let health = query_records(
        &conn,
        &RecordFilter {
            msg_type: Some(MsgType::Health),
            ..RecordFilter::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(health.len(), 2);
    assert!(health.iter().all(|r| r.record.direction == Direction::In));

    let errors = query_records(
        &conn,
        &RecordFilter {
            status: Some(Status::Error),
            ..RecordFilter::default()
        },
    )
    .expect("query should succeed");
    assert!(errors.is_empty());

    let by_client = query_records(
        &conn,
        &RecordFilter {
            client_id: Some("dash-1".to_string()),
            limit: Some(10),
            ..RecordFilter::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(by_client.len(), 1);
    assert_eq!(by_client[0].record.msg_type, MsgType::CmdOpen);
}

#[test]
fn query_respects_time_window() {
    let fx = fixture();
    fx.writer.log_publish(
        "d1",
        "doorlock/d1/data",
        b"{}",
        QoS::AtMostOnce,
        &ClientInfo::default(),
    );

    let conn = fx.pool.get().expect("should get a connection");
    let now = Utc::now();

    let recent = query_records(
        &conn,
        &RecordFilter {
            since: Some(now - Duration::minutes(5)),
            until: Some(now + Duration::minutes(5)),
            ..RecordFilter::default()
        },
    )
    .expect("query should succeed");
    assert_eq!(recent.len(), 1);

    let future = query_records(
        &conn,
        &RecordFilter {
            since: Some(now + Duration::minutes(5)),
            ..RecordFilter::default()
        },
    )
    .expect("query should succeed");
    assert!(future.is_empty());
}

#[test]
fn count_records_by_status() {
    let fx = fixture();
    fail_inserts_when(&fx.pool, "NEW.topic LIKE '%/broken'");
    let none = ClientInfo::default();

    fx.writer
        .log_publish("d1", "doorlock/d1/data", b"{}", QoS::AtMostOnce, &none);
    fx.writer
        .log_publish("d1", "doorlock/d1/broken", b"{}", QoS::AtMostOnce, &none);

    let conn = fx.pool.get().expect("should get a connection");
    assert_eq!(count_records(&conn, None).expect("count"), 1);
    assert_eq!(count_records(&conn, Some(Status::Success)).expect("count"), 1);
    assert_eq!(count_records(&conn, Some(Status::Error)).expect("count"), 0);
}
