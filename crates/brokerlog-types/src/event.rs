//! Lifecycle events emitted by the external broker engine.
//!
//! The broker delivers one JSON object per line, tagged by `"event"`.
//! [`decode_line`] turns such a line into a [`BrokerEvent`].

use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::QoS;

/// One lifecycle event from the broker engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BrokerEvent {
    /// A client completed its connection handshake.
    #[serde(rename = "connect")]
    Connected {
        /// Client identifier.
        client_id: String,
        /// Remote IP address, if the transport exposes one.
        #[serde(default)]
        remote_address: Option<String>,
        /// Remote port, if the transport exposes one.
        #[serde(default)]
        remote_port: Option<u16>,
    },

    /// A client connection closed.
    #[serde(rename = "disconnect")]
    Disconnected {
        /// Client identifier.
        client_id: String,
        /// Free-form reason supplied by the broker.
        #[serde(default)]
        reason: Option<String>,
    },

    /// A client subscribed to one or more topic filters.
    #[serde(rename = "subscribe")]
    Subscribed {
        /// Client identifier.
        client_id: String,
        /// Requested filters with their QoS.
        subscriptions: Vec<SubscriptionRequest>,
    },

    /// A client removed one or more topic filters.
    #[serde(rename = "unsubscribe")]
    Unsubscribed {
        /// Client identifier.
        client_id: String,
        /// Filters removed.
        topics: Vec<String>,
    },

    /// A message was published through the broker.
    #[serde(rename = "publish")]
    Published(PublishEvent),

    /// A protocol or transport error attributed to a connected client.
    #[serde(rename = "client_error")]
    ClientError {
        /// Client identifier.
        client_id: String,
        /// Error description.
        error: String,
    },

    /// A connection-level error, possibly before a client id was known.
    #[serde(rename = "connection_error")]
    ConnectionError {
        /// Client identifier, if one had been negotiated.
        #[serde(default)]
        client_id: Option<String>,
        /// Error description.
        error: String,
    },

    /// A client presented credentials during the handshake.
    #[serde(rename = "auth_attempt")]
    AuthAttempt {
        /// Client identifier.
        client_id: String,
        /// Presented username.
        username: String,
        /// Presented password, if any.
        #[serde(default)]
        password: Option<String>,
    },
}

impl BrokerEvent {
    /// Returns the wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connect",
            Self::Disconnected { .. } => "disconnect",
            Self::Subscribed { .. } => "subscribe",
            Self::Unsubscribed { .. } => "unsubscribe",
            Self::Published(_) => "publish",
            Self::ClientError { .. } => "client_error",
            Self::ConnectionError { .. } => "connection_error",
            Self::AuthAttempt { .. } => "auth_attempt",
        }
    }
}

/// A single topic filter in a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Topic filter.
    pub topic: String,
    /// Requested QoS.
    #[serde(default)]
    pub qos: QoS,
}

/// A publish event with its payload already decoded to bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PublishWire")]
pub struct PublishEvent {
    /// Publishing client, `None` for broker-originated messages.
    pub client_id: Option<String>,
    /// Destination topic.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Delivery QoS.
    pub qos: QoS,
}

/// How a publish payload is carried inside the JSON hook line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// The payload string is the message body as UTF-8 text.
    #[default]
    Utf8,
    /// The payload string is standard base64 of the message body.
    Base64,
}

#[derive(Deserialize)]
struct PublishWire {
    #[serde(default)]
    client_id: Option<String>,
    topic: String,
    #[serde(default)]
    payload: String,
    #[serde(default)]
    encoding: PayloadEncoding,
    #[serde(default)]
    qos: QoS,
}

impl TryFrom<PublishWire> for PublishEvent {
    type Error = base64::DecodeError;

    fn try_from(wire: PublishWire) -> Result<Self, Self::Error> {
        let payload = match wire.encoding {
            PayloadEncoding::Utf8 => wire.payload.into_bytes(),
            PayloadEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(wire.payload.as_bytes())?,
        };

        Ok(Self {
            client_id: wire.client_id,
            topic: wire.topic,
            payload,
            qos: wire.qos,
        })
    }
}

/// Errors that can occur while decoding a hook line.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The line is not a valid event object. Invalid base64 payloads land
    /// here too, with the base64 failure in the message.
    #[error("malformed broker event: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes one newline-delimited hook line into a [`BrokerEvent`].
///
/// Surrounding whitespace, including the trailing newline, is ignored.
///
/// # Errors
///
/// Returns `EventDecodeError::Json` if the line is not a known event or a
/// base64 payload does not decode.
pub fn decode_line(line: &str) -> Result<BrokerEvent, EventDecodeError> {
    Ok(serde_json::from_str(line.trim())?)
}
