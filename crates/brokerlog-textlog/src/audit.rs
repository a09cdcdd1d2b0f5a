//! Non-failing audit sink over a [`RotatingLogger`].

use std::sync::atomic::{AtomicBool, Ordering};

use brokerlog_types::{QoS, SubscriptionRequest};
use chrono::Utc;
use serde_json::{json, Value};

use crate::error::TextLogError;
use crate::rotating::{Level, RotatingLogConfig, RotatingLogger};

/// Publish payloads longer than this many characters are truncated in the
/// text log. The persisted record always keeps the full payload.
pub const MAX_PAYLOAD_LOG_CHARS: usize = 1000;

/// Text audit log shared by every event handler.
///
/// Writes never return an error. The first filesystem failure disables the
/// sink for the rest of the process and is reported once via `tracing`.
#[derive(Debug)]
pub struct AuditLog {
    logger: Option<RotatingLogger>,
    disabled: AtomicBool,
}

impl AuditLog {
    /// Wraps an opened logger.
    pub fn new(logger: RotatingLogger) -> Self {
        Self {
            logger: Some(logger),
            disabled: AtomicBool::new(false),
        }
    }

    /// Opens a logger from `config`, or returns a disabled sink with a
    /// warning if the log directory cannot be created.
    pub fn open(config: RotatingLogConfig) -> Self {
        match RotatingLogger::new(config) {
            Ok(logger) => Self::new(logger),
            Err(e) => {
                tracing::warn!(error = %e, "text logging disabled: log directory unusable");
                Self::disabled()
            }
        }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self {
            logger: None,
            disabled: AtomicBool::new(true),
        }
    }

    /// Returns `true` while lines are still being written.
    pub fn is_enabled(&self) -> bool {
        self.logger.is_some() && !self.disabled.load(Ordering::Acquire)
    }

    /// The underlying logger, if one was opened.
    pub fn logger(&self) -> Option<&RotatingLogger> {
        self.logger.as_ref()
    }

    /// Writes one line, absorbing any failure.
    pub fn record(&self, level: Level, message: &str, data: Option<Value>) {
        let Some(logger) = &self.logger else {
            return;
        };
        if self.disabled.load(Ordering::Acquire) {
            return;
        }

        if let Err(e) = logger.write(level, message, data.as_ref()) {
            self.disable(&e);
        }
    }

    fn disable(&self, error: &TextLogError) {
        if !self.disabled.swap(true, Ordering::AcqRel) {
            tracing::error!(error = %error, "text logging disabled after filesystem failure");
        }
    }

    // ── Lifecycle lines ──────────────────────────────────────────────

    /// `Client connected: <id>`.
    pub fn client_connected(&self, client_id: &str, ip: Option<&str>, port: Option<u16>) {
        self.record(
            Level::Info,
            &format!("Client connected: {client_id}"),
            Some(json!({
                "clientId": client_id,
                "timestamp": now_millis(),
                "ip": ip,
                "port": port,
            })),
        );
    }

    /// `Client disconnected: <id>`.
    pub fn client_disconnected(&self, client_id: &str, reason: Option<&str>) {
        self.record(
            Level::Info,
            &format!("Client disconnected: {client_id}"),
            Some(json!({
                "clientId": client_id,
                "reason": reason.unwrap_or(""),
                "timestamp": now_millis(),
            })),
        );
    }

    /// `Client subscribed: <id>` with each filter and its QoS.
    pub fn subscribed(&self, client_id: &str, subscriptions: &[SubscriptionRequest]) {
        self.record(
            Level::Info,
            &format!("Client subscribed: {client_id}"),
            Some(json!({
                "clientId": client_id,
                "topics": subscriptions,
                "timestamp": now_millis(),
            })),
        );
    }

    /// `Client unsubscribed: <id>`.
    pub fn unsubscribed(&self, client_id: &str, topics: &[String]) {
        self.record(
            Level::Info,
            &format!("Client unsubscribed: {client_id}"),
            Some(json!({
                "clientId": client_id,
                "topics": topics,
                "timestamp": now_millis(),
            })),
        );
    }

    /// `Message published: <topic>` with a truncated payload preview.
    pub fn published(&self, client_id: &str, topic: &str, payload: &[u8], qos: QoS) {
        self.record(
            Level::Info,
            &format!("Message published: {topic}"),
            Some(json!({
                "clientId": client_id,
                "topic": topic,
                "payload": payload_preview(payload),
                "payloadSize": payload.len(),
                "qos": qos.as_u8(),
                "timestamp": now_millis(),
            })),
        );
    }

    /// `Auth attempt: <user> - SUCCESS|FAILED`, WARN on failure.
    pub fn auth_attempt(&self, client_id: &str, username: &str, success: bool) {
        let (level, outcome) = if success {
            (Level::Info, "SUCCESS")
        } else {
            (Level::Warn, "FAILED")
        };
        self.record(
            level,
            &format!("Auth attempt: {username} - {outcome}"),
            Some(json!({
                "clientId": client_id,
                "username": username,
                "success": success,
                "timestamp": now_millis(),
            })),
        );
    }

    /// An ERROR line with the failure text and the client it concerns.
    pub fn error(&self, message: &str, error: &str, client_id: Option<&str>) {
        self.record(
            Level::Error,
            message,
            Some(json!({
                "error": error,
                "context": { "clientId": client_id },
                "timestamp": now_millis(),
            })),
        );
    }

    /// `MQTT Broker started` with the address events arrive on.
    pub fn broker_started(&self, listen_addr: &str) {
        self.record(
            Level::Info,
            "MQTT Broker started",
            Some(json!({
                "hookAddr": listen_addr,
                "timestamp": now_millis(),
            })),
        );
    }

    /// `MQTT Broker stopped`.
    pub fn broker_stopped(&self) {
        self.record(
            Level::Info,
            "MQTT Broker stopped",
            Some(json!({ "timestamp": now_millis() })),
        );
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn payload_preview(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    match text.char_indices().nth(MAX_PAYLOAD_LOG_CHARS) {
        Some((cut, _)) => format!("{}...[truncated]", &text[..cut]),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_short_payloads() {
        assert_eq!(payload_preview(b"{\"ok\":true}"), "{\"ok\":true}");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let payload = "é".repeat(MAX_PAYLOAD_LOG_CHARS + 5);
        let preview = payload_preview(payload.as_bytes());
        assert!(preview.ends_with("...[truncated]"));
        assert_eq!(
            preview.trim_end_matches("...[truncated]").chars().count(),
            MAX_PAYLOAD_LOG_CHARS
        );
    }

    #[test]
    fn disabled_sink_swallows_writes() {
        let log = AuditLog::disabled();
        assert!(!log.is_enabled());
        log.broker_stopped();
        assert!(log.logger().is_none());
    }
}
