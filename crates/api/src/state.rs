use parley_database::{ChatRepository, MessageRepository, User, UserRepository};
use parley_realtime::{RelayRouter, SessionRegistry};
use sqlx::SqlitePool;

use crate::ApiError;

/// Shared handles cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub registry: SessionRegistry,
    pub relay: RelayRouter,
}

impl AppState {
    pub fn new(db_pool: SqlitePool) -> Self {
        let registry = SessionRegistry::new();
        let relay = RelayRouter::new(registry.clone());
        Self {
            db_pool,
            registry,
            relay,
        }
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.db_pool.clone())
    }

    pub fn chats(&self) -> ChatRepository {
        ChatRepository::new(self.db_pool.clone())
    }

    pub fn messages(&self) -> MessageRepository {
        MessageRepository::new(self.db_pool.clone())
    }

    /// Resolve a bearer token to its user, or reject the request.
    pub async fn authenticate(&self, token: &str) -> Result<User, ApiError> {
        self.users()
            .find_by_token(token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("invalid token"))
    }
}
