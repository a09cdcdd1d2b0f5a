//! Broker event logging pipeline.
//!
//! Wires the hook listener, session tracker, text log and persistence
//! writer together. The binary in `main.rs` only resolves configuration,
//! installs diagnostics and drives [`ingress::serve`] until a signal.

pub mod adapter;
pub mod auth;
pub mod config;
pub mod ingress;
pub mod session;

use std::sync::Arc;

use brokerlog_db::DbPool;
use brokerlog_publish::PublishWriter;
use brokerlog_textlog::AuditLog;

use crate::adapter::EventAdapter;
use crate::config::Config;
use crate::session::SessionTracker;

/// Builds the event adapter for `config` over an already migrated pool.
///
/// A text log directory that cannot be created disables text logging with
/// a warning; nothing here fails.
pub fn build_adapter(config: &Config, pool: DbPool) -> EventAdapter {
    let audit = if config.textlog.enabled {
        Arc::new(AuditLog::open(config.textlog.rotating()))
    } else {
        tracing::info!("text logging disabled by configuration");
        Arc::new(AuditLog::disabled())
    };

    let sessions = SessionTracker::new(config.sessions.max_sessions);
    let writer = PublishWriter::new(pool, Arc::clone(&audit));
    EventAdapter::new(audit, sessions, writer, config.auth.credentials())
}
