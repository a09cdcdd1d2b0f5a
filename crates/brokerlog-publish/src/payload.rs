//! Payload decoding and `meta` enrichment.

use brokerlog_types::{ClientInfo, QoS};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

/// Decodes a publish payload as JSON.
///
/// A payload that is not valid JSON is not an error: it becomes
/// `{"raw": <payload as text>, "parse_error": <message>}`.
pub fn parse_payload(payload: &[u8]) -> Value {
    match serde_json::from_slice::<Value>(payload) {
        Ok(value) => value,
        Err(e) => json!({
            "raw": String::from_utf8_lossy(payload),
            "parse_error": e.to_string(),
        }),
    }
}

/// Firmware version reported inside the payload at `meta.fw`, if present.
///
/// Null, `false`, zero and empty strings count as absent.
pub fn firmware_version(parsed: &Value) -> Option<&Value> {
    parsed.pointer("/meta/fw").filter(|fw| match fw {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    })
}

/// Builds the `meta` column for a publish.
pub fn build_meta(
    qos: QoS,
    client: &ClientInfo,
    payload_size: usize,
    received_at: DateTime<Utc>,
    parsed: &Value,
) -> Value {
    let mut meta = Map::new();
    meta.insert("qos".to_string(), json!(qos.as_u8()));
    if let Some(ip) = &client.ip {
        meta.insert("client_ip".to_string(), json!(ip));
    }
    if let Some(port) = client.port {
        meta.insert("client_port".to_string(), json!(port));
    }
    meta.insert("payload_size".to_string(), json!(payload_size));
    meta.insert(
        "received_at".to_string(),
        json!(received_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    if let Some(fw) = firmware_version(parsed) {
        meta.insert("firmware_version".to_string(), fw.clone());
    }
    Value::Object(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_json_payload() {
        let parsed = parse_payload(br#"{"ts":1700000000,"v":1}"#);
        assert_eq!(parsed, json!({"ts": 1700000000, "v": 1}));
    }

    #[test]
    fn scalar_json_is_kept_as_is() {
        assert_eq!(parse_payload(b"42"), json!(42));
        assert_eq!(parse_payload(b"\"on\""), json!("on"));
    }

    #[test]
    fn malformed_payload_keeps_raw_text() {
        let parsed = parse_payload(b"lock1=off");
        assert_eq!(parsed["raw"], "lock1=off");
        assert!(!parsed["parse_error"].as_str().unwrap_or_default().is_empty());
    }

    #[test]
    fn empty_payload_is_a_parse_failure() {
        let parsed = parse_payload(b"");
        assert_eq!(parsed["raw"], "");
        assert!(parsed["parse_error"].is_string());
    }

    #[test]
    fn meta_for_unknown_client_has_no_address() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let meta = build_meta(QoS::AtLeastOnce, &ClientInfo::default(), 3, at, &json!({}));
        assert_eq!(
            meta,
            json!({
                "qos": 1,
                "payload_size": 3,
                "received_at": "2026-10-18T12:00:00.000Z",
            })
        );
    }

    #[test]
    fn meta_copies_firmware_version() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let client = ClientInfo {
            ip: Some("10.0.0.7".to_string()),
            port: Some(50123),
        };
        let parsed = json!({"meta": {"fw": "1.4.2"}, "ok": true});
        let meta = build_meta(QoS::AtMostOnce, &client, 40, at, &parsed);

        assert_eq!(meta["client_ip"], "10.0.0.7");
        assert_eq!(meta["client_port"], 50123);
        assert_eq!(meta["firmware_version"], "1.4.2");
    }

    #[test]
    fn firmware_version_ignores_odd_shapes() {
        assert_eq!(firmware_version(&json!({"meta": "fw"})), None);
        assert_eq!(firmware_version(&json!({"meta": {"fw": ""}})), None);
        assert_eq!(firmware_version(&json!({"meta": {"fw": null}})), None);
        assert_eq!(firmware_version(&json!([1, 2])), None);
        assert_eq!(firmware_version(&json!({"meta": {"fw": 7}})), Some(&json!(7)));
        assert_eq!(firmware_version(&json!({"meta": {"fw": 0}})), None);
        assert_eq!(firmware_version(&json!({"meta": {"fw": 0.0}})), None);
    }
}
