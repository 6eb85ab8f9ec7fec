use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A chat conversation, either direct (exactly two members) or group.
///
/// Only the latest message is cached on the chat row; full history is read
/// through the message store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chat {
    /// Database primary key
    pub id: i64,
    /// Publicly accessible id
    pub public_id: String,
    pub is_group: bool,
    /// Group title, present iff `is_group`
    pub group_name: Option<String>,
    /// Admin user id, present iff `is_group`; always a member
    pub group_admin_id: Option<i64>,
    /// Cached pointer to the most recent message
    pub latest_message_id: Option<i64>,
    /// Canonical member-pair key, present iff the chat is direct
    pub direct_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Chat {
    /// Whether mutation of group metadata/membership is permitted for `user_id`.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.group_admin_id == Some(user_id)
    }
}
