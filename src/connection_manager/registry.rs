use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::ServerFrame;

use super::stats::{RegistryStats, SessionInfo};
use super::types::{ConnectionHandle, RegistryError};

/// Owns every live connection and the session -> connection bindings.
///
/// All binding mutations go through `bind`, `unbind` and `prune_stale`. Each
/// of them runs under the DashMap guard for the session key, so the
/// supersession tie-break for a given session is serialized.
pub struct SessionRegistry {
    /// connection_id -> ConnectionHandle (bound or not)
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// session_id -> the single connection currently bound to it
    sessions: DashMap<String, Arc<ConnectionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Track a freshly accepted connection. The handle starts in `CONNECTING`.
    pub fn connect(
        &self,
        remote_addr: Option<SocketAddr>,
        sender: mpsc::Sender<ServerFrame>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(remote_addr, sender));
        self.connections.insert(handle.id, handle.clone());

        tracing::debug!(connection_id = %handle.id, remote_addr = ?remote_addr, "Connection tracked");

        handle
    }

    /// Forget a connection and release its session binding if it still owns it.
    pub fn disconnect(&self, handle: &ConnectionHandle) -> bool {
        self.connections.remove(&handle.id);
        self.unbind(handle)
    }

    /// Bind `session_id` to `handle`, closing any other connection that held it.
    ///
    /// Returns the connection this call closed, if any. A stale binding that was
    /// already closed is replaced without being reported. A connection owns at
    /// most one session, so binding a new id releases the handle's previous one.
    pub fn bind(
        &self,
        session_id: &str,
        handle: &Arc<ConnectionHandle>,
    ) -> Result<Option<Arc<ConnectionHandle>>, RegistryError> {
        if session_id.is_empty() {
            return Err(RegistryError::EmptySessionId);
        }

        if let Some(previous) = handle.session_id() {
            if previous != session_id {
                self.sessions
                    .remove_if(&previous, |_, bound| bound.id == handle.id);
            }
        }

        let replaced = match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(mut entry) => {
                // Set before the closed check: a concurrent close that misses the
                // check is guaranteed to see the session and unbind after us.
                handle.set_session_id(session_id);
                if handle.is_closed() {
                    return Err(RegistryError::ConnectionClosed(handle.id));
                }
                let old = entry.insert(handle.clone());
                (old.id != handle.id).then_some(old)
            }
            Entry::Vacant(entry) => {
                handle.set_session_id(session_id);
                if handle.is_closed() {
                    return Err(RegistryError::ConnectionClosed(handle.id));
                }
                entry.insert(handle.clone());
                None
            }
        };

        // Guard released: closing the loser never runs under the registry lock.
        // A stale entry that was already closed is replaced silently.
        let superseded = replaced.filter(|old| old.close());
        if let Some(old) = &superseded {
            tracing::info!(
                session_id = %session_id,
                superseded_connection_id = %old.id,
                connection_id = %handle.id,
                "Session superseded, closed previous connection"
            );
        }

        Ok(superseded)
    }

    /// Current binding for a session
    pub fn lookup(&self, session_id: &str) -> Option<Arc<ConnectionHandle>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Remove the handle's binding if and only if it still points at this handle.
    pub fn unbind(&self, handle: &ConnectionHandle) -> bool {
        let Some(session_id) = handle.session_id() else {
            return false;
        };

        let removed = self
            .sessions
            .remove_if(&session_id, |_, bound| bound.id == handle.id)
            .is_some();

        if removed {
            tracing::info!(
                session_id = %session_id,
                connection_id = %handle.id,
                remaining = self.sessions.len(),
                "Session unbound"
            );
        }

        removed
    }

    /// Drop a binding found pointing at a connection that is no longer open.
    pub fn prune_stale(&self, session_id: &str, handle: &ConnectionHandle) -> bool {
        self.sessions
            .remove_if(session_id, |_, bound| {
                bound.id == handle.id && !bound.is_open()
            })
            .is_some()
    }

    /// Number of bound sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of tracked connections, bound or not
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Snapshot of the bound sessions, ordered by session id
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| {
                let handle = entry.value();
                let state = handle.state();
                SessionInfo {
                    session_id: entry.key().clone(),
                    connected: handle.is_open(),
                    state,
                }
            })
            .collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        sessions
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_connections: self.connections.len(),
            bound_sessions: self.sessions.len(),
        }
    }

    /// Close every tracked connection. Returns how many were still open.
    pub fn close_all(&self) -> usize {
        let handles: Vec<Arc<ConnectionHandle>> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        handles.iter().filter(|handle| handle.close()).count()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_manager::ConnectionState;

    fn open_handle(registry: &SessionRegistry) -> (Arc<ConnectionHandle>, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let handle = registry.connect(None, tx);
        handle.open();
        (handle, rx)
    }

    #[test]
    fn test_bind_and_lookup() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);

        assert!(registry.bind("cw-1", &a).unwrap().is_none());
        assert_eq!(registry.lookup("cw-1").unwrap().id, a.id);
        assert_eq!(a.session_id().as_deref(), Some("cw-1"));
        assert_eq!(registry.count(), 1);
        assert!(registry.lookup("other").is_none());
    }

    #[test]
    fn test_bind_rejects_empty_session() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);

        assert_eq!(registry.bind("", &a).unwrap_err(), RegistryError::EmptySessionId);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_bind_rejects_closed_connection() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);
        a.close();

        assert_eq!(
            registry.bind("cw-1", &a).unwrap_err(),
            RegistryError::ConnectionClosed(a.id)
        );
        assert!(registry.lookup("cw-1").is_none());
    }

    #[test]
    fn test_supersession_closes_previous() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = open_handle(&registry);
        let (b, _rx_b) = open_handle(&registry);

        registry.bind("s", &a).unwrap();
        let superseded = registry.bind("s", &b).unwrap().unwrap();

        assert_eq!(superseded.id, a.id);
        assert_eq!(a.state(), ConnectionState::Closed);
        assert!(b.is_open());
        assert_eq!(registry.lookup("s").unwrap().id, b.id);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_replacing_stale_binding_is_not_a_supersession() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = open_handle(&registry);
        let (b, _rx_b) = open_handle(&registry);

        registry.bind("s", &a).unwrap();
        // Closed but its teardown has not unbound it yet
        a.close();

        assert!(registry.bind("s", &b).unwrap().is_none());
        assert_eq!(registry.lookup("s").unwrap().id, b.id);
    }

    #[test]
    fn test_late_unbind_does_not_evict_new_binding() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = open_handle(&registry);
        let (b, _rx_b) = open_handle(&registry);

        registry.bind("s", &a).unwrap();
        registry.bind("s", &b).unwrap();

        // A's teardown arrives after B already owns the session
        assert!(!registry.disconnect(&a));
        assert_eq!(registry.lookup("s").unwrap().id, b.id);
    }

    #[test]
    fn test_rebind_same_session_is_idempotent() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);

        registry.bind("s", &a).unwrap();
        assert!(registry.bind("s", &a).unwrap().is_none());
        assert!(a.is_open());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_rebind_new_session_releases_old() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);

        registry.bind("first", &a).unwrap();
        registry.bind("second", &a).unwrap();

        assert!(registry.lookup("first").is_none());
        assert_eq!(registry.lookup("second").unwrap().id, a.id);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_disconnect_releases_binding() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);
        registry.bind("s", &a).unwrap();

        a.close();
        assert!(registry.disconnect(&a));
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_disconnect_unregistered_connection() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);

        assert!(!registry.disconnect(&a));
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_prune_stale_only_removes_closed_identity() {
        let registry = SessionRegistry::new();
        let (a, _rx) = open_handle(&registry);
        registry.bind("s", &a).unwrap();

        // Still open: not stale
        assert!(!registry.prune_stale("s", &a));

        a.close();
        assert!(registry.prune_stale("s", &a));
        assert!(registry.lookup("s").is_none());
    }

    #[test]
    fn test_list_and_stats() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = open_handle(&registry);
        let (b, _rx_b) = open_handle(&registry);
        let (_c, _rx_c) = open_handle(&registry);

        registry.bind("b-session", &b).unwrap();
        registry.bind("a-session", &a).unwrap();

        let sessions = registry.list();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "a-session");
        assert!(sessions[0].connected);
        assert_eq!(sessions[1].state, ConnectionState::Open);

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.bound_sessions, 2);
    }

    #[test]
    fn test_close_all() {
        let registry = SessionRegistry::new();
        let (a, _rx_a) = open_handle(&registry);
        let (b, _rx_b) = open_handle(&registry);
        b.close();

        assert_eq!(registry.close_all(), 1);
        assert!(a.is_closed());
    }
}
