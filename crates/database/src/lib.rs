//! Persistence layer for the Parley chat backend.
//!
//! Chats, memberships, and messages live in SQLite behind repository types.
//! The chat table caches a pointer to its most recent message so the chat
//! list can be ordered and previewed without scanning message history.

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use connection::prepare_database;
pub use entities::{Chat, Message, MessageWithSender, User, UserSummary};
pub use migrations::run_migrations;
pub use repos::{ChatRepository, MessageRepository, UserRepository};
pub use types::{StoreError, StoreResult};
