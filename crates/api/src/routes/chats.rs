use axum::{extract::State, http::HeaderMap, Json};
use parley_database::{Chat, MessageWithSender, UserSummary};
use serde::{Deserialize, Serialize};

use crate::{util::require_bearer, ApiError, AppState};

/// A chat as returned to clients, hydrated with members and a preview of
/// the most recent message.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub is_group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_admin: Option<String>,
    pub members: Vec<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<MessageWithSender>,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenDirectChatRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub user_ids: Vec<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameGroupRequest {
    pub chat_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupMemberRequest {
    pub chat_id: String,
    pub user_id: String,
}

/// POST /api/chat. Fetch or create the direct chat with another user.
pub async fn open_direct_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<OpenDirectChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let chat = state
        .chats()
        .get_or_create_direct(user.id, &request.user_id)
        .await?;

    Ok(Json(hydrate_chat(&state, chat).await?))
}

/// GET /api/chat. All chats of the caller, most recently active first.
pub async fn list_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatResponse>>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let chats = state.chats().list_for_user(user.id).await?;

    let mut responses = Vec::with_capacity(chats.len());
    for chat in chats {
        responses.push(hydrate_chat(&state, chat).await?);
    }
    Ok(Json(responses))
}

/// POST /api/chat/group.
pub async fn create_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateGroupRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let chat = state
        .chats()
        .create_group(user.id, &request.user_ids, &request.name)
        .await?;

    Ok(Json(hydrate_chat(&state, chat).await?))
}

/// PUT /api/chat/rename.
pub async fn rename_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RenameGroupRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let chat = state
        .chats()
        .rename_group(&request.chat_id, user.id, &request.name)
        .await?;

    Ok(Json(hydrate_chat(&state, chat).await?))
}

/// PUT /api/chat/groupadd.
pub async fn add_to_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GroupMemberRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let chat = state
        .chats()
        .add_member(&request.chat_id, user.id, &request.user_id)
        .await?;

    Ok(Json(hydrate_chat(&state, chat).await?))
}

/// PUT /api/chat/groupremove. Admins remove anyone; members remove themselves.
pub async fn remove_from_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GroupMemberRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let chat = state
        .chats()
        .remove_member(&request.chat_id, user.id, &request.user_id)
        .await?;

    Ok(Json(hydrate_chat(&state, chat).await?))
}

async fn hydrate_chat(state: &AppState, chat: Chat) -> Result<ChatResponse, ApiError> {
    let members = state.chats().members(chat.id).await?;
    let latest_message = state.messages().latest_for_chat(chat.id).await?;

    let group_admin = match chat.group_admin_id {
        Some(admin_id) => resolve_admin(state, admin_id).await?,
        None => None,
    };

    Ok(ChatResponse {
        id: chat.public_id,
        is_group: chat.is_group,
        group_name: chat.group_name,
        group_admin,
        members,
        latest_message,
        updated_at: chat.updated_at,
    })
}

async fn resolve_admin(state: &AppState, admin_id: i64) -> Result<Option<String>, ApiError> {
    let public_id: Option<String> = sqlx::query_scalar("SELECT public_id FROM users WHERE id = ?")
        .bind(admin_id)
        .fetch_optional(&state.db_pool)
        .await
        .map_err(parley_database::StoreError::from)?;
    Ok(public_id)
}
