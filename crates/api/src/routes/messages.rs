use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use parley_database::{MessageWithSender, UserSummary};
use parley_realtime::{ChatPayload, MessagePayload, SenderPayload};
use serde::Deserialize;
use tracing::info;

use crate::{util::require_bearer, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: String,
    pub content: String,
}

/// GET /api/message/:chat_id. Full history, oldest first. Members only.
pub async fn list_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<MessageWithSender>>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let messages = state.messages().list_for_chat(user.id, &chat_id).await?;
    Ok(Json(messages))
}

/// POST /api/message. Persist the message, then push it to every online
/// member except the sender.
///
/// Delivery happens after the transaction commits, so a pushed message is
/// always readable through history. Offline members simply miss the push.
pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<MessageWithSender>, ApiError> {
    let token = require_bearer(&headers)?;
    let user = state.authenticate(&token).await?;

    let (message, member_ids) = state
        .messages()
        .create(user.id, &request.chat_id, &request.content)
        .await?;

    let chat = state
        .chats()
        .find_by_public_id(&request.chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("chat disappeared during send"))?;

    let payload = MessagePayload {
        id: message.public_id.clone(),
        content: message.content.clone(),
        created_at: message.created_at.clone(),
        sender: SenderPayload {
            id: user.public_id.clone(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
        },
        chat: ChatPayload {
            id: chat.public_id.clone(),
            is_group: chat.is_group,
            group_name: chat.group_name.clone(),
        },
    };

    let report = state.relay.deliver(&payload, &member_ids, user.id).await;
    info!(
        chat_id = %chat.public_id,
        delivered = report.delivered,
        offline = report.offline,
        "message relayed"
    );

    Ok(Json(MessageWithSender {
        id: message.public_id,
        chat_id: chat.public_id,
        content: message.content,
        created_at: message.created_at,
        sender: UserSummary::from(&user),
    }))
}
