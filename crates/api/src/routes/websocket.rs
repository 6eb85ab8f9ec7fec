use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use parley_database::User;
use parley_realtime::{ClientEvent, ConnectionId, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

/// GET /ws?token=... Upgrades to a realtime session.
///
/// The token is checked before the upgrade completes; an unauthenticated
/// client never gets a socket.
pub async fn websocket_handler(
    Query(params): Query<WebSocketQuery>,
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, StatusCode> {
    let token = params.token.ok_or(StatusCode::UNAUTHORIZED)?;
    let user = state
        .authenticate(&token)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let ws = ws.ok_or(StatusCode::UPGRADE_REQUIRED)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let (mut ws_sender, mut receiver) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(100);
    let writer_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(error) => {
                    warn!(?error, "failed to serialize outbound event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let connection_id = state.registry.register(out_tx.clone()).await;
    info!(connection = %connection_id, user_id = user.id, "websocket connected");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, connection_id, &out_tx, &state, &user).await;
                }
                Err(error) => {
                    debug!(user_id = user.id, ?error, "unparseable client event");
                    let _ = out_tx
                        .send(ServerEvent::Error {
                            message: "invalid event format".to_string(),
                        })
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            // Ping and pong are handled by axum; binary frames are ignored.
            _ => {}
        }
    }

    state.registry.remove(connection_id).await;
    drop(out_tx);
    let _ = writer_task.await;
    info!(connection = %connection_id, user_id = user.id, "websocket disconnected");
}

async fn handle_client_event(
    event: ClientEvent,
    connection_id: ConnectionId,
    out_tx: &mpsc::Sender<ServerEvent>,
    state: &AppState,
    user: &User,
) {
    match event {
        ClientEvent::Setup => {
            if state.registry.associate(connection_id, user.id).await.is_ok() {
                let _ = out_tx.send(ServerEvent::Connected).await;
            }
        }
        ClientEvent::JoinChat { chat_id } => {
            match membership(state, user.id, &chat_id).await {
                Ok(true) => match state.registry.join_room(connection_id, &chat_id).await {
                    Ok(()) => debug!(user_id = user.id, %chat_id, "joined chat room"),
                    Err(error) => {
                        let _ = out_tx
                            .send(ServerEvent::Error {
                                message: error.to_string(),
                            })
                            .await;
                    }
                },
                Ok(false) => {
                    let _ = out_tx
                        .send(ServerEvent::Error {
                            message: "not a member of this chat".to_string(),
                        })
                        .await;
                }
                Err(_) => {
                    let _ = out_tx
                        .send(ServerEvent::Error {
                            message: "chat lookup failed".to_string(),
                        })
                        .await;
                }
            }
        }
        ClientEvent::LeaveChat { chat_id } => {
            let _ = state.registry.leave_room(connection_id, &chat_id).await;
        }
    }
}

/// Whether the user belongs to the chat named by `chat_public_id`.
async fn membership(
    state: &AppState,
    user_id: i64,
    chat_public_id: &str,
) -> Result<bool, sqlx::Error> {
    let chat_id: Option<i64> = sqlx::query_scalar("SELECT id FROM chats WHERE public_id = ?")
        .bind(chat_public_id)
        .fetch_optional(&state.db_pool)
        .await?;

    let Some(chat_id) = chat_id else {
        return Ok(false);
    };

    let member: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(user_id)
            .fetch_optional(&state.db_pool)
            .await?;

    Ok(member.is_some())
}
