//! Identity directory lookups.
//!
//! Credential issuance lives outside this system; the repository only
//! resolves tokens the external authenticator has already handed out.

use crate::entities::User;
use crate::types::{StoreError, StoreResult};
use sqlx::SqlitePool;

const USER_COLUMNS: &str =
    "id, public_id, display_name, avatar_url, token, created_at, updated_at";

pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve a bearer token to its verified user.
    pub async fn find_by_token(&self, token: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_public_id(&self, public_id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE public_id = ?"
        ))
        .bind(public_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Register a profile handed over by the identity context.
    pub async fn create(
        &self,
        display_name: &str,
        avatar_url: Option<&str>,
        token: &str,
    ) -> StoreResult<User> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(StoreError::invalid_request("display name must not be empty"));
        }

        let public_id = cuid2::create_id();
        let now = chrono::Utc::now().to_rfc3339();

        let id = sqlx::query(
            r#"
            INSERT INTO users (public_id, display_name, avatar_url, token, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(display_name)
        .bind(avatar_url)
        .bind(token)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(User {
            id,
            public_id,
            display_name: display_name.to_string(),
            avatar_url: avatar_url.map(|url| url.to_string()),
            token: token.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }
}
