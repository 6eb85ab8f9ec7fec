use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user as resolved by the identity directory.
///
/// Parley does not issue credentials; the `token` column holds the opaque
/// bearer credential produced by the external authenticator, and the
/// directory only maps it back to a verified identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub public_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Public profile fields embedded in chat and message responses.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct UserSummary {
    #[sqlx(rename = "public_id")]
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.public_id.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}
