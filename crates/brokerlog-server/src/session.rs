//! In-memory tracking of connected clients.
//!
//! Entries are created on connect, refreshed on every publish and removed
//! on disconnect. Nothing here is persisted; a restart starts empty.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use brokerlog_types::ClientInfo;
use chrono::{DateTime, Utc};

/// Default upper bound on tracked sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10_000;

/// Connection metadata for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    /// Remote IP address.
    pub remote_address: Option<String>,
    /// Remote port.
    pub remote_port: Option<u16>,
    /// When the client connected.
    pub connected_at: DateTime<Utc>,
    /// Last publish attributed to this client (or the connect time).
    pub last_seen: DateTime<Utc>,
}

impl SessionEntry {
    /// Address metadata used to enrich persisted records.
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            ip: self.remote_address.clone(),
            port: self.remote_port,
        }
    }
}

/// Client id → session map shared by all event handlers.
///
/// Every operation takes the lock for a single map access and never holds
/// it across I/O. The map is bounded: connecting a new client at capacity
/// evicts the entry that has been quiet the longest.
#[derive(Clone, Debug)]
pub struct SessionTracker {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    max_sessions: usize,
}

impl SessionTracker {
    /// Creates an empty tracker holding at most `max_sessions` entries.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionEntry>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("session tracker lock poisoned, recovering with current state");
                poisoned.into_inner()
            }
        }
    }

    /// Records a new connection at the current time.
    pub fn connect(&self, client_id: &str, remote_address: Option<String>, remote_port: Option<u16>) {
        self.connect_at(client_id, remote_address, remote_port, Utc::now());
    }

    /// Records a new connection at `now`, replacing any previous session
    /// under the same client id.
    pub fn connect_at(
        &self,
        client_id: &str,
        remote_address: Option<String>,
        remote_port: Option<u16>,
        now: DateTime<Utc>,
    ) {
        let mut sessions = self.lock();

        if !sessions.contains_key(client_id) && sessions.len() >= self.max_sessions {
            let stalest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(id) = stalest {
                tracing::warn!(
                    evicted = %id,
                    max_sessions = self.max_sessions,
                    "session table full, evicting least recently seen client"
                );
                sessions.remove(&id);
            }
        }

        sessions.insert(
            client_id.to_string(),
            SessionEntry {
                remote_address,
                remote_port,
                connected_at: now,
                last_seen: now,
            },
        );
    }

    /// Marks activity for `client_id` and returns its address metadata.
    ///
    /// Unknown clients yield empty metadata.
    pub fn touch(&self, client_id: &str) -> ClientInfo {
        self.touch_at(client_id, Utc::now())
    }

    /// Like [`touch`](Self::touch) with an explicit clock. `last_seen` never
    /// moves backwards.
    pub fn touch_at(&self, client_id: &str, now: DateTime<Utc>) -> ClientInfo {
        let mut sessions = self.lock();
        match sessions.get_mut(client_id) {
            Some(entry) => {
                if now > entry.last_seen {
                    entry.last_seen = now;
                }
                entry.client_info()
            }
            None => ClientInfo::default(),
        }
    }

    /// Removes the session for `client_id`, returning it if it existed.
    pub fn disconnect(&self, client_id: &str) -> Option<SessionEntry> {
        self.lock().remove(client_id)
    }

    /// Snapshot of one session.
    pub fn get(&self, client_id: &str) -> Option<SessionEntry> {
        self.lock().get(client_id).cloned()
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no client is tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn connect_publish_disconnect_leaves_no_entry() {
        let tracker = SessionTracker::default();

        tracker.connect("A", Some("10.0.0.7".to_string()), Some(50123));
        let info = tracker.touch("A");
        assert_eq!(info.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(info.port, Some(50123));

        let removed = tracker.disconnect("A").expect("session should exist");
        assert_eq!(removed.remote_port, Some(50123));
        assert!(tracker.get("A").is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn unknown_client_yields_empty_metadata() {
        let tracker = SessionTracker::default();
        let info = tracker.touch("ghost");
        assert!(info.is_empty());
        assert!(tracker.disconnect("ghost").is_none());
    }

    #[test]
    fn connected_at_is_fixed_and_last_seen_advances() {
        let tracker = SessionTracker::default();
        let t0 = Utc::now();

        tracker.connect_at("A", None, None, t0);
        tracker.touch_at("A", t0 + Duration::seconds(5));

        let entry = tracker.get("A").expect("session should exist");
        assert_eq!(entry.connected_at, t0);
        assert_eq!(entry.last_seen, t0 + Duration::seconds(5));
    }

    #[test]
    fn last_seen_never_moves_backwards() {
        let tracker = SessionTracker::default();
        let t0 = Utc::now();

        tracker.connect_at("A", None, None, t0);
        tracker.touch_at("A", t0 + Duration::seconds(10));
        tracker.touch_at("A", t0 + Duration::seconds(3));

        let entry = tracker.get("A").expect("session should exist");
        assert_eq!(entry.last_seen, t0 + Duration::seconds(10));
    }

    #[test]
    fn reconnect_starts_a_new_session() {
        let tracker = SessionTracker::default();
        let t0 = Utc::now();

        tracker.connect_at("A", Some("10.0.0.1".to_string()), Some(1), t0);
        tracker.connect_at("A", Some("10.0.0.2".to_string()), Some(2), t0 + Duration::seconds(1));

        let entry = tracker.get("A").expect("session should exist");
        assert_eq!(entry.remote_address.as_deref(), Some("10.0.0.2"));
        assert_eq!(entry.connected_at, t0 + Duration::seconds(1));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn full_table_evicts_least_recently_seen() {
        let tracker = SessionTracker::new(2);
        let t0 = Utc::now();

        tracker.connect_at("old", None, None, t0);
        tracker.connect_at("busy", None, None, t0 + Duration::seconds(1));
        tracker.touch_at("old", t0 + Duration::seconds(2));
        tracker.connect_at("new", None, None, t0 + Duration::seconds(3));

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get("busy").is_none(), "quietest client should be evicted");
        assert!(tracker.get("old").is_some());
        assert!(tracker.get("new").is_some());
    }
}
