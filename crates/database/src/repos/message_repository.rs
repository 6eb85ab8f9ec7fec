//! Repository for the append-only message log.

use crate::entities::{Message, MessageWithSender};
use crate::types::{StoreError, StoreResult};
use sqlx::SqlitePool;
use tracing::info;

pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message and advance the chat's latest-message pointer.
    ///
    /// Both writes happen in one transaction so the pointer can never name
    /// a message that was not persisted. Returns the stored message together
    /// with the full member list, which the caller needs for fan-out.
    pub async fn create(
        &self,
        sender_id: i64,
        chat_public_id: &str,
        content: &str,
    ) -> StoreResult<(Message, Vec<i64>)> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::invalid_request("message content must not be empty"));
        }

        let chat_id = self.require_membership(sender_id, chat_public_id).await?;

        let member_ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY id",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        let public_id = cuid2::create_id();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let message_id = sqlx::query(
            r#"
            INSERT INTO messages (public_id, chat_id, sender_id, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(chat_id)
        .bind(sender_id)
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE chats SET latest_message_id = ?, updated_at = ? WHERE id = ?")
            .bind(message_id)
            .bind(&now)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(chat_id, message_id, sender_id, "stored message");

        let message = Message {
            id: message_id,
            public_id,
            chat_id,
            sender_id,
            content: content.to_string(),
            created_at: now,
        };

        Ok((message, member_ids))
    }

    /// Full history of a chat in chronological order, oldest first.
    pub async fn list_for_chat(
        &self,
        requester_id: i64,
        chat_public_id: &str,
    ) -> StoreResult<Vec<MessageWithSender>> {
        let chat_id = self.require_membership(requester_id, chat_public_id).await?;

        let messages = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.public_id, c.public_id AS chat_public_id, m.content, m.created_at,
                   u.public_id AS sender_public_id, u.display_name, u.avatar_url
            FROM messages m
            JOIN chats c ON c.id = m.chat_id
            JOIN users u ON u.id = m.sender_id
            WHERE m.chat_id = ?
            ORDER BY m.created_at ASC, m.id ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages.into_iter().map(MessageRow::into_payload).collect())
    }

    /// The message the chat's latest pointer names, hydrated for previews.
    pub async fn latest_for_chat(&self, chat_id: i64) -> StoreResult<Option<MessageWithSender>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT m.public_id, c.public_id AS chat_public_id, m.content, m.created_at,
                   u.public_id AS sender_public_id, u.display_name, u.avatar_url
            FROM chats c
            JOIN messages m ON m.id = c.latest_message_id
            JOIN users u ON u.id = m.sender_id
            WHERE c.id = ?
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(MessageRow::into_payload))
    }

    /// Resolve the chat and ensure the user belongs to it.
    async fn require_membership(&self, user_id: i64, chat_public_id: &str) -> StoreResult<i64> {
        let chat_id: Option<i64> = sqlx::query_scalar("SELECT id FROM chats WHERE public_id = ?")
            .bind(chat_public_id)
            .fetch_optional(&self.pool)
            .await?;

        let chat_id =
            chat_id.ok_or_else(|| StoreError::not_found(format!("chat {chat_public_id}")))?;

        let member: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        if member.is_none() {
            return Err(StoreError::forbidden("not a member of this chat"));
        }

        Ok(chat_id)
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    public_id: String,
    chat_public_id: String,
    content: String,
    created_at: String,
    sender_public_id: String,
    display_name: String,
    avatar_url: Option<String>,
}

impl MessageRow {
    fn into_payload(self) -> MessageWithSender {
        MessageWithSender {
            id: self.public_id,
            chat_id: self.chat_public_id,
            content: self.content,
            created_at: self.created_at,
            sender: crate::entities::UserSummary {
                id: self.sender_public_id,
                display_name: self.display_name,
                avatar_url: self.avatar_url,
            },
        }
    }
}
