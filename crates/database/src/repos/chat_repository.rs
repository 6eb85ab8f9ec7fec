//! Repository for chat and membership operations.

use crate::entities::{Chat, UserSummary};
use crate::types::{StoreError, StoreResult};
use sqlx::SqlitePool;
use tracing::info;

const CHAT_COLUMNS: &str = "id, public_id, is_group, group_name, group_admin_id, \
     latest_message_id, direct_key, created_at, updated_at";

/// Canonical key for the unordered member pair of a direct chat.
fn direct_key(user_a: i64, user_b: i64) -> String {
    let (low, high) = if user_a < user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{low}:{high}")
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}

pub struct ChatRepository {
    pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Return the direct chat between the requester and the given user,
    /// creating it if none exists yet.
    ///
    /// The member pair is the identity key for direct chats: the same chat
    /// is returned regardless of which side asks first.
    pub async fn get_or_create_direct(
        &self,
        requester_id: i64,
        other_public_id: &str,
    ) -> StoreResult<Chat> {
        let other_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM users WHERE public_id = ?")
                .bind(other_public_id)
                .fetch_optional(&self.pool)
                .await?;

        let other_id = other_id
            .ok_or_else(|| StoreError::not_found(format!("user {other_public_id}")))?;

        if other_id == requester_id {
            return Err(StoreError::invalid_request(
                "cannot open a direct chat with yourself",
            ));
        }

        let key = direct_key(requester_id, other_id);
        if let Some(existing) = self.find_by_direct_key(&key).await? {
            return Ok(existing);
        }

        match self.insert_direct_chat(requester_id, other_id, &key).await {
            Ok(chat) => Ok(chat),
            // Lost the race against the other side of the pair; the unique
            // key on chats.direct_key guarantees their row is the only one.
            Err(StoreError::Database(error)) if is_unique_violation(&error) => self
                .find_by_direct_key(&key)
                .await?
                .ok_or(StoreError::Database(error)),
            Err(error) => Err(error),
        }
    }

    async fn find_by_direct_key(&self, key: &str) -> StoreResult<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE direct_key = ?"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    async fn insert_direct_chat(
        &self,
        requester_id: i64,
        other_id: i64,
        key: &str,
    ) -> StoreResult<Chat> {
        let public_id = cuid2::create_id();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let chat_id = sqlx::query(
            r#"
            INSERT INTO chats (public_id, is_group, direct_key, created_at, updated_at)
            VALUES (?, 0, ?, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(key)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for user_id in [requester_id, other_id] {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(user_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(chat_id, public_id = %public_id, "created direct chat");

        Ok(Chat {
            id: chat_id,
            public_id,
            is_group: false,
            group_name: None,
            group_admin_id: None,
            latest_message_id: None,
            direct_key: Some(key.to_string()),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// All chats the user belongs to, most recently active first.
    ///
    /// The descending `updated_at` order is a hard contract: it drives the
    /// client's chat list.
    pub async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Chat>> {
        let chats = sqlx::query_as::<_, Chat>(&format!(
            r#"
            SELECT {CHAT_COLUMNS}
            FROM chats
            WHERE id IN (SELECT chat_id FROM chat_members WHERE user_id = ?)
            ORDER BY updated_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chats)
    }

    /// Create a group chat with the creator as admin.
    pub async fn create_group(
        &self,
        creator_id: i64,
        member_public_ids: &[String],
        group_name: &str,
    ) -> StoreResult<Chat> {
        let group_name = group_name.trim();
        if group_name.is_empty() {
            return Err(StoreError::invalid_request("group name must not be empty"));
        }

        let mut member_ids = Vec::with_capacity(member_public_ids.len());
        for public_id in member_public_ids {
            let id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE public_id = ?")
                .bind(public_id)
                .fetch_optional(&self.pool)
                .await?;
            let id = id.ok_or_else(|| StoreError::not_found(format!("user {public_id}")))?;
            if id != creator_id && !member_ids.contains(&id) {
                member_ids.push(id);
            }
        }

        if member_ids.len() < 2 {
            return Err(StoreError::invalid_request(
                "a group chat needs at least 2 members besides the creator",
            ));
        }

        let public_id = cuid2::create_id();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let chat_id = sqlx::query(
            r#"
            INSERT INTO chats (public_id, is_group, group_name, group_admin_id, created_at, updated_at)
            VALUES (?, 1, ?, ?, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(group_name)
        .bind(creator_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for user_id in std::iter::once(creator_id).chain(member_ids.iter().copied()) {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
                .bind(chat_id)
                .bind(user_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            chat_id,
            public_id = %public_id,
            members = member_ids.len() + 1,
            "created group chat"
        );

        Ok(Chat {
            id: chat_id,
            public_id,
            is_group: true,
            group_name: Some(group_name.to_string()),
            group_admin_id: Some(creator_id),
            latest_message_id: None,
            direct_key: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Rename a group chat. Admin only.
    pub async fn rename_group(
        &self,
        chat_public_id: &str,
        actor_id: i64,
        group_name: &str,
    ) -> StoreResult<Chat> {
        let group_name = group_name.trim();
        if group_name.is_empty() {
            return Err(StoreError::invalid_request("group name must not be empty"));
        }

        let chat = self.require_group(chat_public_id).await?;
        if !chat.is_admin(actor_id) {
            return Err(StoreError::forbidden("only the group admin may rename"));
        }

        // `updated_at` tracks message activity only; metadata edits must
        // not reorder the chat list.
        sqlx::query("UPDATE chats SET group_name = ? WHERE id = ?")
            .bind(group_name)
            .bind(chat.id)
            .execute(&self.pool)
            .await?;

        Ok(Chat {
            group_name: Some(group_name.to_string()),
            ..chat
        })
    }

    /// Add a user to a group chat. Admin only.
    pub async fn add_member(
        &self,
        chat_public_id: &str,
        actor_id: i64,
        user_public_id: &str,
    ) -> StoreResult<Chat> {
        let chat = self.require_group(chat_public_id).await?;
        if !chat.is_admin(actor_id) {
            return Err(StoreError::forbidden("only the group admin may add members"));
        }

        let user_id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE public_id = ?")
            .bind(user_public_id)
            .fetch_optional(&self.pool)
            .await?;
        let user_id =
            user_id.ok_or_else(|| StoreError::not_found(format!("user {user_public_id}")))?;

        if self.is_member(chat.id, user_id).await? {
            return Err(StoreError::invalid_request("user is already a member"));
        }

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(chat.id)
            .bind(user_id)
            .bind(&now)
            .execute(&self.pool)
            .await?;

        info!(chat_id = chat.id, user_id, "added group member");
        Ok(chat)
    }

    /// Remove a user from a group chat. Admin only, except that any member
    /// may remove themself.
    ///
    /// A departing admin hands the role to the longest-standing remaining
    /// member in the same transaction, so the admin is always a member.
    pub async fn remove_member(
        &self,
        chat_public_id: &str,
        actor_id: i64,
        user_public_id: &str,
    ) -> StoreResult<Chat> {
        let chat = self.require_group(chat_public_id).await?;

        let user_id: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE public_id = ?")
            .bind(user_public_id)
            .fetch_optional(&self.pool)
            .await?;
        let user_id =
            user_id.ok_or_else(|| StoreError::not_found(format!("user {user_public_id}")))?;

        if user_id != actor_id && !chat.is_admin(actor_id) {
            return Err(StoreError::forbidden(
                "only the group admin may remove other members",
            ));
        }

        if !self.is_member(chat.id, user_id).await? {
            return Err(StoreError::invalid_request("user is not a member"));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if chat.is_admin(user_id) {
            sqlx::query(
                r#"
                UPDATE chats
                SET group_admin_id = (
                    SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY id LIMIT 1
                )
                WHERE id = ?
                "#,
            )
            .bind(chat.id)
            .bind(chat.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(chat_id = chat.id, user_id, "removed group member");

        self.find_by_public_id(chat_public_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("chat {chat_public_id}")))
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<Chat>> {
        let chat = sqlx::query_as::<_, Chat>(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE public_id = ?"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(chat)
    }

    pub async fn is_member(&self, chat_id: i64, user_id: i64) -> StoreResult<bool> {
        let row: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?")
                .bind(chat_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    pub async fn member_ids(&self, chat_id: i64) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY id",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Member profiles for response assembly.
    pub async fn members(&self, chat_id: i64) -> StoreResult<Vec<UserSummary>> {
        let members = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT u.public_id, u.display_name, u.avatar_url
            FROM users u
            JOIN chat_members m ON u.id = m.user_id
            WHERE m.chat_id = ?
            ORDER BY m.id
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    async fn require_group(&self, chat_public_id: &str) -> StoreResult<Chat> {
        let chat = self
            .find_by_public_id(chat_public_id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("chat {chat_public_id}")))?;

        if !chat.is_group {
            return Err(StoreError::invalid_request(
                "operation only applies to group chats",
            ));
        }

        Ok(chat)
    }
}
