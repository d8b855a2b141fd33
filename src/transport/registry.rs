use std::sync::Arc;

use tracing::info;

use crate::packet::CloseCode;
use crate::transport::Conn;
use crate::utils::SafeMap;

/// ClientID to live connection table. At most one entry per ClientID.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    conns: Arc<SafeMap<String, Conn>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `conn` under `client_id`. A connection previously stored
    /// under the same key is closed with `DuplicateLogin` and returned.
    pub fn register(&self, client_id: &str, conn: Conn) -> Option<Conn> {
        let id = conn.id();
        let evicted = self
            .conns
            .insert(client_id.to_string(), conn)
            .filter(|old| old.id() != id);
        if let Some(old) = &evicted {
            info!(client_id, old = old.id(), new = id, "duplicate login");
            old.close(CloseCode::DuplicateLogin);
        }
        evicted
    }

    /// The live connection for `client_id`.
    pub fn get(&self, client_id: &str) -> Option<Conn> {
        self.conns.get(&client_id.to_string())
    }

    /// Removes the entry for `client_id` only while it still points at
    /// connection `conn_id`.
    pub fn remove_if(&self, client_id: &str, conn_id: u64) -> Option<Conn> {
        self.conns
            .remove_if(&client_id.to_string(), |c| c.id() == conn_id)
    }

    /// Every connection authenticated as `user_id`.
    pub fn by_user(&self, user_id: &str) -> Vec<Conn> {
        self.conns
            .filter_values(|_, c| c.identity().is_some_and(|i| i.user_id == user_id))
    }

    /// Snapshot of every registered connection.
    pub fn all(&self) -> Vec<Conn> {
        self.conns.values()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}
