//! Connection-to-session registry.
//!
//! One entry per open connection, 1:1, inserted at connect and removed on
//! `end` or transport close. The registry is an explicit store owned by
//! application state and passed where needed, deliberately not a global,
//! so tests can build as many independent instances as they like.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::session::Session;

/// Registry invariant violations. These indicate a connection lifecycle bug
/// and are fatal to the affected connection, never silently ignored.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("connection {0} already has a live session")]
    AlreadyRegistered(Uuid),
}

/// Shared handle to one registered session.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Process-wide map from connection identity to session.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for a connection. Insertion is atomic: a second
    /// `create` for the same id fails without touching the live entry.
    pub fn create(
        &self,
        connection_id: Uuid,
        session: Session,
    ) -> Result<SessionHandle, RegistryError> {
        match self.sessions.entry(connection_id) {
            dashmap::Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(connection_id)),
            dashmap::Entry::Vacant(vacant) => {
                let handle = Arc::new(Mutex::new(session));
                vacant.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    pub fn get(&self, connection_id: Uuid) -> Option<SessionHandle> {
        self.sessions
            .get(&connection_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a connection's entry. Removal is atomic with respect to
    /// inserts; once this returns, inbound dispatch can no longer reach the
    /// session.
    pub fn remove(&self, connection_id: Uuid) -> Option<SessionHandle> {
        self.sessions
            .remove(&connection_id)
            .map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conversation::session::SessionConfig;
    use crate::core::provider::ScriptedProvider;
    use tokio::sync::mpsc;

    fn test_session(id: Uuid) -> Session {
        let (outbound, _outbound_rx) = mpsc::channel(8);
        let (signals, _signal_rx) = mpsc::channel(8);
        Session::new(
            id,
            Arc::new(ScriptedProvider::new()),
            outbound,
            signals,
            SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();

        assert!(registry.get(id).is_none());
        registry.create(id, test_session(id)).unwrap();
        assert_eq!(registry.len(), 1);

        let handle = registry.get(id).expect("session should be registered");
        assert_eq!(handle.lock().await.id(), id);

        registry.remove(id);
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_double_create_is_an_error() {
        let registry = SessionRegistry::new();
        let id = Uuid::new_v4();

        registry.create(id, test_session(id)).unwrap();
        let err = registry.create(id, test_session(id)).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(conflict) if conflict == id));

        // The live entry survives the failed insert.
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = SessionRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.create(a, test_session(a)).unwrap();
        registry.create(b, test_session(b)).unwrap();
        assert_eq!(registry.len(), 2);

        registry.remove(a);
        assert!(registry.get(a).is_none());
        assert!(registry.get(b).is_some());
    }
}
