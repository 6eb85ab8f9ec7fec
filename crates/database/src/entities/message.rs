use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::UserSummary;

/// A persisted chat message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub public_id: String,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub created_at: String,
}

/// A message hydrated with its sender's profile, as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageWithSender {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub created_at: String,
    pub sender: UserSummary,
}
