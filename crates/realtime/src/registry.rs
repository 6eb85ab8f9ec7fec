//! Tracks live socket connections and which user sits behind each one.
//!
//! The registry is the only holder of connection state. Callers go through
//! its methods; the maps themselves are never exposed. A user may hold
//! several connections at once (one per device or tab), and every one of
//! them receives deliveries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::events::ServerEvent;

/// Opaque handle identifying one live socket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("connection is not registered")]
    UnknownConnection,
    #[error("connection has not completed setup")]
    NotAssociated,
}

struct Connection {
    sender: mpsc::Sender<ServerEvent>,
    user_id: Option<i64>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<i64, HashSet<ConnectionId>>,
}

/// Shared, clonable registry of live connections.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted connection. It delivers nothing until
    /// [`associate`](Self::associate) binds it to a user.
    pub async fn register(&self, sender: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let id = ConnectionId(Uuid::new_v4());
        let mut inner = self.inner.write().await;
        inner.connections.insert(
            id,
            Connection {
                sender,
                user_id: None,
                rooms: HashSet::new(),
            },
        );
        debug!(connection = %id, "registered connection");
        id
    }

    /// Bind a connection to its authenticated user. Idempotent for the same
    /// user; re-binding to a different user moves the connection over.
    pub async fn associate(&self, id: ConnectionId, user_id: i64) -> Result<(), RealtimeError> {
        let mut inner = self.inner.write().await;
        let conn = inner
            .connections
            .get_mut(&id)
            .ok_or(RealtimeError::UnknownConnection)?;

        let previous = conn.user_id.replace(user_id);
        if let Some(prev) = previous.filter(|prev| *prev != user_id) {
            if let Some(set) = inner.by_user.get_mut(&prev) {
                set.remove(&id);
                if set.is_empty() {
                    inner.by_user.remove(&prev);
                }
            }
        }
        inner.by_user.entry(user_id).or_default().insert(id);
        debug!(connection = %id, user_id, "associated connection");
        Ok(())
    }

    /// Subscribe an associated connection to a chat room. Membership checks
    /// are the caller's responsibility; the registry only records the fact.
    pub async fn join_room(&self, id: ConnectionId, chat_id: &str) -> Result<(), RealtimeError> {
        let mut inner = self.inner.write().await;
        let conn = inner
            .connections
            .get_mut(&id)
            .ok_or(RealtimeError::UnknownConnection)?;
        if conn.user_id.is_none() {
            return Err(RealtimeError::NotAssociated);
        }
        conn.rooms.insert(chat_id.to_string());
        debug!(connection = %id, chat_id, "joined room");
        Ok(())
    }

    pub async fn leave_room(&self, id: ConnectionId, chat_id: &str) -> Result<(), RealtimeError> {
        let mut inner = self.inner.write().await;
        let conn = inner
            .connections
            .get_mut(&id)
            .ok_or(RealtimeError::UnknownConnection)?;
        conn.rooms.remove(chat_id);
        Ok(())
    }

    /// Forget a connection entirely. Safe to call twice.
    pub async fn remove(&self, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        if let Some(conn) = inner.connections.remove(&id) {
            if let Some(user_id) = conn.user_id {
                if let Some(set) = inner.by_user.get_mut(&user_id) {
                    set.remove(&id);
                    if set.is_empty() {
                        inner.by_user.remove(&user_id);
                    }
                }
            }
            debug!(connection = %id, "removed connection");
        }
    }

    /// Sender halves for every live connection the user currently holds.
    pub async fn online_connections_for(&self, user_id: i64) -> Vec<mpsc::Sender<ServerEvent>> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(&user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.connections.get(id))
                    .map(|conn| conn.sender.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.inner.read().await.by_user.contains_key(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn connection_is_invisible_until_associated() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;

        assert!(registry.online_connections_for(7).await.is_empty());

        registry.associate(id, 7).await.unwrap();
        assert_eq!(registry.online_connections_for(7).await.len(), 1);
        assert!(registry.is_online(7).await);
    }

    #[tokio::test]
    async fn associate_is_idempotent() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;

        registry.associate(id, 7).await.unwrap();
        registry.associate(id, 7).await.unwrap();

        assert_eq!(registry.online_connections_for(7).await.len(), 1);
    }

    #[tokio::test]
    async fn multiple_devices_are_all_reachable() {
        let registry = SessionRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let phone = registry.register(tx1).await;
        let laptop = registry.register(tx2).await;
        registry.associate(phone, 7).await.unwrap();
        registry.associate(laptop, 7).await.unwrap();

        assert_eq!(registry.online_connections_for(7).await.len(), 2);

        registry.remove(phone).await;
        assert_eq!(registry.online_connections_for(7).await.len(), 1);
        assert!(registry.is_online(7).await);

        registry.remove(laptop).await;
        assert!(!registry.is_online(7).await);
    }

    #[tokio::test]
    async fn join_room_requires_setup() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;

        let result = registry.join_room(id, "c1").await;
        assert!(matches!(result, Err(RealtimeError::NotAssociated)));

        registry.associate(id, 7).await.unwrap();
        registry.join_room(id, "c1").await.unwrap();
        registry.leave_room(id, "c1").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx).await;
        registry.remove(id).await;

        let result = registry.associate(id, 7).await;
        assert!(matches!(result, Err(RealtimeError::UnknownConnection)));

        // Removing twice is a no-op.
        registry.remove(id).await;
    }
}
