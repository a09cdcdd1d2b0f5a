//! Record types for the `broker_logs` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flow direction of a publish relative to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Device to broker.
    #[default]
    In,
    /// Broker to device (commands).
    Out,
}

impl Direction {
    /// Returns the column value for this direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            _ => Err(ParseColumnError::new("direction", s)),
        }
    }
}

/// Message category derived from the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    /// Open/lock command sent to a device.
    CmdOpen,
    /// Device reply to a command.
    CmdResponse,
    /// Periodic device health report.
    Health,
    /// Anything else.
    #[default]
    Other,
}

impl MsgType {
    /// Returns the column value for this message type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CmdOpen => "cmd_open",
            Self::CmdResponse => "cmd_response",
            Self::Health => "health",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for MsgType {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cmd_open" => Ok(Self::CmdOpen),
            "cmd_response" => Ok(Self::CmdResponse),
            "health" => Ok(Self::Health),
            "other" => Ok(Self::Other),
            _ => Err(ParseColumnError::new("msg_type", s)),
        }
    }
}

/// Outcome of storing a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The record carries the parsed payload.
    Success,
    /// The primary insert failed; this is the fallback marker row.
    Error,
}

impl Status {
    /// Returns the column value for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = ParseColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            _ => Err(ParseColumnError::new("status", s)),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),+) => {
        $(impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        })+
    };
}

display_as_str!(Direction, MsgType, Status);

/// Error returned when a stored column holds an unknown enumeration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {column} value: {value}")]
pub struct ParseColumnError {
    /// Column being parsed.
    pub column: &'static str,
    /// Offending value.
    pub value: String,
}

impl ParseColumnError {
    fn new(column: &'static str, value: &str) -> Self {
        Self {
            column,
            value: value.to_string(),
        }
    }
}

/// Structured interpretation of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicClass {
    /// Second path segment, if the topic has one.
    pub device_id: Option<String>,
    /// Category derived from topic substrings.
    pub msg_type: MsgType,
    /// Flow direction derived from topic substrings.
    pub direction: Direction,
}

/// One persisted publish event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Capture instant, set by the writer.
    pub ts: DateTime<Utc>,
    /// Target device, from the topic.
    pub device_id: Option<String>,
    /// Publishing client, or `broker` when there was none.
    pub client_id: String,
    /// Flow direction.
    pub direction: Direction,
    /// Full topic, verbatim.
    pub topic: String,
    /// Message category.
    pub msg_type: MsgType,
    /// Whether this row carries the payload or the failure marker.
    pub status: Status,
    /// Parsed payload, or `{raw, parse_error}` when it was not JSON.
    pub payload: Value,
    /// QoS, client address, payload size, capture time, firmware version.
    pub meta: Value,
}

/// A [`LogRecord`] read back from the store with its row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Auto-incremented row id.
    pub id: i64,
    /// The record columns.
    #[serde(flatten)]
    pub record: LogRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_columns_round_trip_through_strings() {
        for d in [Direction::In, Direction::Out] {
            assert_eq!(d.as_str().parse::<Direction>(), Ok(d));
        }
        for m in [MsgType::CmdOpen, MsgType::CmdResponse, MsgType::Health, MsgType::Other] {
            assert_eq!(m.as_str().parse::<MsgType>(), Ok(m));
        }
        for s in [Status::Success, Status::Error] {
            assert_eq!(s.as_str().parse::<Status>(), Ok(s));
        }
    }

    #[test]
    fn unknown_column_value_is_rejected() {
        let err = "sideways".parse::<Direction>().expect_err("should reject");
        assert_eq!(err.to_string(), "unknown direction value: sideways");
    }

    #[test]
    fn serde_uses_column_spelling() {
        assert_eq!(serde_json::to_value(MsgType::CmdResponse).unwrap(), "cmd_response");
        assert_eq!(serde_json::to_value(Direction::Out).unwrap(), "out");
        assert_eq!(serde_json::to_value(Status::Error).unwrap(), "error");
    }
}
