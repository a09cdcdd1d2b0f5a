//! Human-readable audit log for broker lifecycle events.
//!
//! Two layers live here:
//!
//! - [`RotatingLogger`] appends formatted lines to an active file and rotates
//!   it by size into a bounded chain of numbered archives. Every write
//!   returns once the line has been handed to the filesystem; I/O failures
//!   are returned to the caller.
//! - [`AuditLog`] wraps an optional logger and never fails. The first
//!   filesystem error disables it and is reported once through `tracing`,
//!   so a broken disk stops text logging but nothing else.
//!
//! # Line format
//!
//! ```text
//! [2026-10-18T09:30:12.345Z] [INFO] Client connected: esp-door-01 | Data: {"clientId":"esp-door-01"}
//! ```
//!
//! The ` | Data: <JSON>` suffix is present only when structured data is
//! supplied.

mod audit;
mod error;
mod rotating;

pub use audit::{AuditLog, MAX_PAYLOAD_LOG_CHARS};
pub use error::TextLogError;
pub use rotating::{format_line, Level, RotatingLogConfig, RotatingLogger};
