//! Shared types for the broker telemetry pipeline.
//!
//! This crate provides the lifecycle event model emitted by the external
//! broker engine, delivery-guarantee levels, the per-client connection
//! metadata used to enrich persisted records, and the small set of
//! constants every other crate agrees on.
//!
//! No crate in the workspace depends on anything *except* `brokerlog-types`
//! for cross-cutting type definitions.

use serde::{Deserialize, Serialize};

mod event;

pub use event::{
    decode_line, BrokerEvent, EventDecodeError, PayloadEncoding, PublishEvent,
    SubscriptionRequest,
};

/// Reserved topic prefix for broker-internal metrics.
///
/// Publishes on these topics are never classified, persisted, or written to
/// the text log.
pub const SYS_TOPIC_PREFIX: &str = "$SYS";

/// Client identifier recorded for publishes that have no originating client.
pub const BROKER_CLIENT_ID: &str = "broker";

/// Returns `true` if `topic` belongs to the reserved `$SYS` namespace.
pub fn is_system_topic(topic: &str) -> bool {
    topic.starts_with(SYS_TOPIC_PREFIX)
}

/// Delivery-guarantee level attached to a publish or subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery.
    AtLeastOnce = 1,
    /// Assured single delivery.
    ExactlyOnce = 2,
}

impl QoS {
    /// Returns the numeric level.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Attempts to convert a numeric level to a `QoS`.
    ///
    /// Returns `None` for anything other than 0, 1 or 2.
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos.as_u8()
    }
}

impl TryFrom<u8> for QoS {
    type Error = InvalidQos;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_u8(level).ok_or(InvalidQos(level))
    }
}

/// Error returned for a QoS level outside 0..=2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid QoS level: {0}")]
pub struct InvalidQos(pub u8);

/// Connection metadata of a client as known at the time of a publish.
///
/// Both fields are absent for broker-originated publishes and for clients
/// that are no longer tracked; serialising such a value yields `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Remote IP address of the client connection.
    #[serde(rename = "client_ip", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Remote port of the client connection.
    #[serde(rename = "client_port", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ClientInfo {
    /// Returns `true` when no connection metadata is known.
    pub fn is_empty(&self) -> bool {
        self.ip.is_none() && self.port.is_none()
    }
}
