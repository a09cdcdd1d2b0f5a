//! Publish classification and persistence.
//!
//! Every broker publish outside the reserved `$SYS` namespace becomes one
//! row in `broker_logs`, which the query API reads for device lists,
//! statistics and log retrieval.
//!
//! # Pipeline
//!
//! 1. [`classify`] maps the topic to a device id, message type and flow
//!    direction.
//! 2. [`parse_payload`] decodes the payload as JSON, degrading to a
//!    `{raw, parse_error}` object rather than failing.
//! 3. [`build_meta`] gathers QoS, client address, payload size, capture
//!    time and the firmware version reported by the device.
//! 4. [`PublishWriter`] inserts the row, falling back once to an
//!    `error`-status marker row when the insert fails.
//!
//! # Usage
//!
//! ```rust,ignore
//! use brokerlog_publish::{PublishWriter, WriteOutcome};
//!
//! let writer = PublishWriter::new(pool, audit);
//! let outcome = writer.log_publish(
//!     "dash-1",
//!     "doorlock/esp-door-01/cmd/open",
//!     br#"{"ts":1700000000,"v":1,"command":{"lock1":"off"}}"#,
//!     QoS::AtLeastOnce,
//!     &ClientInfo::default(),
//! );
//! assert!(matches!(outcome, WriteOutcome::Stored(_)));
//! ```

mod classify;
mod error;
mod payload;
mod record;
mod store;
mod writer;

pub use classify::{classify, device_id, direction, msg_type};
pub use error::PublishError;
pub use payload::{build_meta, firmware_version, parse_payload};
pub use record::{Direction, LogRecord, MsgType, ParseColumnError, Status, StoredRecord, TopicClass};
pub use store::{count_records, insert_record, query_records, RecordFilter};
pub use writer::{PublishWriter, WriteOutcome, FALLBACK_PAYLOAD_ERROR};

#[cfg(test)]
mod tests;
