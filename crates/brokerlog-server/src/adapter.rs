//! Fan-out of broker lifecycle events.
//!
//! [`EventAdapter::dispatch`] sends each event to the text log and, for
//! publishes, to the session tracker and the persistence writer. It makes
//! no classification or storage decisions of its own beyond skipping the
//! reserved `$SYS` namespace.

use std::sync::Arc;

use brokerlog_publish::{PublishWriter, WriteOutcome};
use brokerlog_textlog::AuditLog;
use brokerlog_types::{is_system_topic, BrokerEvent, PublishEvent, BROKER_CLIENT_ID};
use tokio::task::JoinHandle;

use crate::auth::Credentials;
use crate::session::SessionTracker;

/// What [`EventAdapter::dispatch`] did with an event.
#[derive(Debug)]
pub enum Dispatched {
    /// Text log and session bookkeeping only.
    Logged,
    /// `$SYS` publish, nothing recorded.
    Ignored,
    /// Publish handed to the persistence writer on a blocking worker.
    /// Dropping the handle detaches the write.
    Persisting(JoinHandle<WriteOutcome>),
    /// Authentication decision for an `auth_attempt`.
    Auth {
        /// Whether the broker should accept the client.
        allow: bool,
    },
}

/// Routes broker events to the pipeline components.
#[derive(Clone)]
pub struct EventAdapter {
    audit: Arc<AuditLog>,
    sessions: SessionTracker,
    writer: PublishWriter,
    credentials: Arc<Credentials>,
}

impl EventAdapter {
    /// Creates an adapter over already constructed components.
    pub fn new(
        audit: Arc<AuditLog>,
        sessions: SessionTracker,
        writer: PublishWriter,
        credentials: Credentials,
    ) -> Self {
        Self {
            audit,
            sessions,
            writer,
            credentials: Arc::new(credentials),
        }
    }

    /// The text log events are written to.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The session tracker updated by connect, publish and disconnect.
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Handles one event.
    ///
    /// Text log appends happen inline. Publish persistence is spawned onto
    /// the runtime's blocking pool so a slow or stalled store never holds
    /// up the caller; this must therefore be called from within a Tokio
    /// runtime.
    pub fn dispatch(&self, event: BrokerEvent) -> Dispatched {
        match event {
            BrokerEvent::Connected {
                client_id,
                remote_address,
                remote_port,
            } => {
                self.audit
                    .client_connected(&client_id, remote_address.as_deref(), remote_port);
                self.sessions.connect(&client_id, remote_address, remote_port);
                Dispatched::Logged
            }
            BrokerEvent::Disconnected { client_id, reason } => {
                self.audit.client_disconnected(&client_id, reason.as_deref());
                self.sessions.disconnect(&client_id);
                Dispatched::Logged
            }
            BrokerEvent::Subscribed {
                client_id,
                subscriptions,
            } => {
                self.audit.subscribed(&client_id, &subscriptions);
                Dispatched::Logged
            }
            BrokerEvent::Unsubscribed { client_id, topics } => {
                self.audit.unsubscribed(&client_id, &topics);
                Dispatched::Logged
            }
            BrokerEvent::Published(publish) => self.publish(publish),
            BrokerEvent::ClientError { client_id, error } => {
                self.audit
                    .error(&format!("Client error: {client_id}"), &error, Some(&client_id));
                Dispatched::Logged
            }
            BrokerEvent::ConnectionError { client_id, error } => {
                self.audit
                    .error("Connection error", &error, client_id.as_deref());
                Dispatched::Logged
            }
            BrokerEvent::AuthAttempt {
                client_id,
                username,
                password,
            } => {
                let allow = self.credentials.verify(&username, password.as_deref());
                self.audit.auth_attempt(&client_id, &username, allow);
                Dispatched::Auth { allow }
            }
        }
    }

    fn publish(&self, publish: PublishEvent) -> Dispatched {
        if is_system_topic(&publish.topic) {
            return Dispatched::Ignored;
        }

        let client_id = publish
            .client_id
            .unwrap_or_else(|| BROKER_CLIENT_ID.to_string());

        self.audit
            .published(&client_id, &publish.topic, &publish.payload, publish.qos);
        let client = self.sessions.touch(&client_id);

        let writer = self.writer.clone();
        let handle = tokio::task::spawn_blocking(move || {
            writer.log_publish(
                &client_id,
                &publish.topic,
                &publish.payload,
                publish.qos,
                &client,
            )
        });
        Dispatched::Persisting(handle)
    }

    /// Writes the startup line.
    pub fn broker_started(&self, listen_addr: &str) {
        self.audit.broker_started(listen_addr);
        if self.credentials.is_enabled() {
            let users: Vec<&str> = self.credentials.usernames().collect();
            tracing::info!(users = ?users, "broker client authentication enabled");
        } else {
            tracing::info!("broker client authentication disabled, allowing all clients");
        }
    }

    /// Writes the final line before the store is closed.
    pub fn broker_stopped(&self) {
        self.audit.broker_stopped();
    }
}
