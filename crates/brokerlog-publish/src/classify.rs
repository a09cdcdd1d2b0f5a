//! Topic classification.
//!
//! Topics follow `<product>/<device-id>/<kind>/<name>`, e.g.
//! `doorlock/esp-door-01/cmd/open`. Classification is substring based and
//! ordered; the first matching rule wins.

use brokerlog_types::is_system_topic;

use crate::record::{Direction, MsgType, TopicClass};

/// Ordered `msg_type` rules.
const MSG_TYPE_RULES: &[(&str, MsgType)] = &[
    ("/cmd/open", MsgType::CmdOpen),
    ("/cmd/response", MsgType::CmdResponse),
    ("/event/health", MsgType::Health),
];

/// Marker for broker-to-device traffic. Checked before [`INBOUND_MARKERS`].
const OUTBOUND_MARKER: &str = "/cmd/";

const INBOUND_MARKERS: &[&str] = &["/data", "/health", "/heartbeat"];

/// Classifies a topic, or returns `None` for the reserved `$SYS` namespace.
pub fn classify(topic: &str) -> Option<TopicClass> {
    if is_system_topic(topic) {
        return None;
    }

    Some(TopicClass {
        device_id: device_id(topic).map(str::to_string),
        msg_type: msg_type(topic),
        direction: direction(topic),
    })
}

/// Second slash-delimited segment, or `None` with fewer than two segments.
pub fn device_id(topic: &str) -> Option<&str> {
    topic.split('/').nth(1)
}

/// First matching category, `Other` when nothing matches.
pub fn msg_type(topic: &str) -> MsgType {
    MSG_TYPE_RULES
        .iter()
        .find(|(marker, _)| topic.contains(marker))
        .map_or(MsgType::Other, |&(_, kind)| kind)
}

/// `Out` for command topics, otherwise `In`.
pub fn direction(topic: &str) -> Direction {
    if topic.contains(OUTBOUND_MARKER) {
        return Direction::Out;
    }
    if INBOUND_MARKERS.iter().any(|marker| topic.contains(marker)) {
        return Direction::In;
    }
    Direction::In
}
