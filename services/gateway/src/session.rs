//! Per-connection session state and the session table.
//!
//! A Session is created when an upgrade is accepted and destroyed when the
//! read loop exits.  The owning read loop is the sole mutator; everything
//! else takes read snapshots.  Client ids are monotonic and unique for the
//! process lifetime.

use crate::auth::Principal;
use cam_protocol::EventTopic;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Mutable per-connection state.
#[derive(Debug, Clone)]
pub struct Session {
    pub client_id: u64,
    pub principal: Option<Principal>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub subscribed_topics: HashSet<EventTopic>,
}

impl Session {
    fn new(client_id: u64) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            principal: None,
            connected_at: now,
            last_activity: now,
            subscribed_topics: HashSet::new(),
        }
    }

    pub fn authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// Authenticated and the backing token has not expired.
    pub fn auth_valid(&self, now: DateTime<Utc>) -> bool {
        self.principal.as_ref().is_some_and(|p| p.is_valid_at(now))
    }
}

/// Registry of live sessions keyed by client id.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<u64, Session>>,
    next_client_id: AtomicU64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a session for a freshly accepted connection.
    pub fn create(&self) -> u64 {
        let client_id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.insert(client_id, Session::new(client_id));
        client_id
    }

    /// Remove a session; returns it for final inspection.  Idempotent.
    pub fn remove(&self, client_id: u64) -> Option<Session> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&client_id)
    }

    pub fn len(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, client_id: u64) -> Option<Session> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.get(&client_id).cloned()
    }

    /// Attach an authenticated principal (the `authenticate` handler's job).
    pub fn set_principal(&self, client_id: u64, principal: Principal) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get_mut(&client_id) {
            session.principal = Some(principal);
        }
    }

    /// Record inbound traffic on the connection.
    pub fn touch(&self, client_id: u64) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get_mut(&client_id) {
            session.last_activity = Utc::now();
        }
    }

    /// Replace the session's view of its subscribed topics.
    pub fn set_topics(&self, client_id: u64, topics: HashSet<EventTopic>) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = sessions.get_mut(&client_id) {
            session.subscribed_topics = topics;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use crate::permissions::Role;

    #[test]
    fn client_ids_are_monotonic_and_unique() {
        let table = SessionTable::new();
        let a = table.create();
        let b = table.create();
        let c = table.create();
        assert!(a < b && b < c);
        assert_eq!(table.len(), 3);

        table.remove(b);
        let d = table.create();
        assert!(d > c, "ids are never reused");
    }

    #[test]
    fn remove_is_idempotent() {
        let table = SessionTable::new();
        let id = table.create();
        assert!(table.remove(id).is_some());
        assert!(table.remove(id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn principal_attachment_flips_auth_state() {
        let table = SessionTable::new();
        let id = table.create();
        assert!(!table.get(id).unwrap().authenticated());

        table.set_principal(
            id,
            Principal {
                user: "alice".to_owned(),
                role: Role::Operator,
                auth_method: AuthMethod::Bearer,
                expires_at: None,
            },
        );
        let session = table.get(id).unwrap();
        assert!(session.authenticated());
        assert!(session.auth_valid(Utc::now()));
    }

    #[test]
    fn expired_principal_fails_auth_valid() {
        let table = SessionTable::new();
        let id = table.create();
        table.set_principal(
            id,
            Principal {
                user: "bob".to_owned(),
                role: Role::Viewer,
                auth_method: AuthMethod::Bearer,
                expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            },
        );
        let session = table.get(id).unwrap();
        assert!(session.authenticated());
        assert!(!session.auth_valid(Utc::now()));
    }
}
