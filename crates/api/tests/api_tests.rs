//! End-to-end tests over the router, without a listening socket.

use axum::body::Body;
use axum::http::{header::AUTHORIZATION, Request, StatusCode};
use http_body_util::BodyExt;
use parley_api::{build_router, AppState};
use parley_database::test_support::{create_test_pool, seed_user};
use parley_database::User;
use parley_realtime::ServerEvent;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_state() -> AppState {
    AppState::new(create_test_pool().await)
}

fn bearer(user: &User) -> String {
    format!("Bearer {}", user.token)
}

async fn send_json(
    state: &AppState,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(AUTHORIZATION, auth);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let state = test_state().await;
    let (status, body) = send_json(&state, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let state = test_state().await;
    let (status, _) = send_json(&state, "GET", "/api/chat", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_json(
        &state,
        "GET",
        "/api/chat",
        Some("Bearer not-a-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_chat_roundtrip_is_deduplicated() {
    let state = test_state().await;
    let alice = seed_user(&state.db_pool, "Alice").await;
    let bob = seed_user(&state.db_pool, "Bob").await;

    let (status, first) = send_json(
        &state,
        "POST",
        "/api/chat",
        Some(&bearer(&alice)),
        Some(json!({ "user_id": bob.public_id.clone() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["is_group"], false);
    assert_eq!(first["members"].as_array().unwrap().len(), 2);

    // Bob opening the chat from his side lands in the same conversation.
    let (status, second) = send_json(
        &state,
        "POST",
        "/api/chat",
        Some(&bearer(&bob)),
        Some(json!({ "user_id": alice.public_id.clone() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
}

#[tokio::test]
async fn chat_list_orders_by_recent_activity() {
    let state = test_state().await;
    let alice = seed_user(&state.db_pool, "Alice").await;
    let bob = seed_user(&state.db_pool, "Bob").await;
    let cara = seed_user(&state.db_pool, "Cara").await;

    let (_, with_bob) = send_json(
        &state,
        "POST",
        "/api/chat",
        Some(&bearer(&alice)),
        Some(json!({ "user_id": bob.public_id.clone() })),
    )
    .await;
    let (_, with_cara) = send_json(
        &state,
        "POST",
        "/api/chat",
        Some(&bearer(&alice)),
        Some(json!({ "user_id": cara.public_id.clone() })),
    )
    .await;

    // Activity in the older chat bumps it to the front.
    let (status, _) = send_json(
        &state,
        "POST",
        "/api/message",
        Some(&bearer(&alice)),
        Some(json!({ "chat_id": with_bob["id"], "content": "ping" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, list) = send_json(&state, "GET", "/api/chat", Some(&bearer(&alice)), None).await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], with_bob["id"]);
    assert_eq!(list[1]["id"], with_cara["id"]);
    assert_eq!(list[0]["latest_message"]["content"], "ping");
}

#[tokio::test]
async fn sending_a_message_pushes_to_online_members_only() {
    let state = test_state().await;
    let alice = seed_user(&state.db_pool, "Alice").await;
    let bob = seed_user(&state.db_pool, "Bob").await;
    let eve = seed_user(&state.db_pool, "Eve").await;

    let (_, chat) = send_json(
        &state,
        "POST",
        "/api/chat",
        Some(&bearer(&alice)),
        Some(json!({ "user_id": bob.public_id.clone() })),
    )
    .await;
    let chat_id = chat["id"].as_str().unwrap().to_string();

    // Stand in for live sockets with bare channels.
    let (alice_tx, mut alice_rx) = tokio::sync::mpsc::channel(8);
    let (bob_tx, mut bob_rx) = tokio::sync::mpsc::channel(8);
    let (eve_tx, mut eve_rx) = tokio::sync::mpsc::channel(8);
    let alice_conn = state.registry.register(alice_tx).await;
    let bob_conn = state.registry.register(bob_tx).await;
    let eve_conn = state.registry.register(eve_tx).await;
    state.registry.associate(alice_conn, alice.id).await.unwrap();
    state.registry.associate(bob_conn, bob.id).await.unwrap();
    state.registry.associate(eve_conn, eve.id).await.unwrap();

    let (status, sent) = send_json(
        &state,
        "POST",
        "/api/message",
        Some(&bearer(&alice)),
        Some(json!({ "chat_id": chat_id, "content": "hello bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sent["content"], "hello bob");
    assert_eq!(sent["sender"]["display_name"], "Alice");

    match bob_rx.try_recv().unwrap() {
        ServerEvent::MessageReceived { message } => {
            assert_eq!(message.content, "hello bob");
            assert_eq!(message.chat.id, chat_id);
            assert_eq!(message.sender.display_name, "Alice");
        }
        other => panic!("expected message_received, got {other:?}"),
    }
    match bob_rx.try_recv().unwrap() {
        ServerEvent::NotificationReceived {
            chat_id: notified,
            sender_name,
        } => {
            assert_eq!(notified, chat_id);
            assert_eq!(sender_name, "Alice");
        }
        other => panic!("expected notification_received, got {other:?}"),
    }

    // The sender's own connection stays quiet, and so does an online
    // user who is not a member of the chat.
    assert!(alice_rx.try_recv().is_err());
    assert!(eve_rx.try_recv().is_err());
}

#[tokio::test]
async fn message_history_is_members_only_and_ordered() {
    let state = test_state().await;
    let alice = seed_user(&state.db_pool, "Alice").await;
    let bob = seed_user(&state.db_pool, "Bob").await;
    let eve = seed_user(&state.db_pool, "Eve").await;

    let (_, chat) = send_json(
        &state,
        "POST",
        "/api/chat",
        Some(&bearer(&alice)),
        Some(json!({ "user_id": bob.public_id.clone() })),
    )
    .await;
    let chat_id = chat["id"].as_str().unwrap();

    for content in ["one", "two"] {
        send_json(
            &state,
            "POST",
            "/api/message",
            Some(&bearer(&alice)),
            Some(json!({ "chat_id": chat_id, "content": content })),
        )
        .await;
    }

    let (status, history) = send_json(
        &state,
        "GET",
        &format!("/api/message/{chat_id}"),
        Some(&bearer(&bob)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["content"], "one");
    assert_eq!(history[1]["content"], "two");

    let (status, _) = send_json(
        &state,
        "GET",
        &format!("/api/message/{chat_id}"),
        Some(&bearer(&eve)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_sends_map_to_client_errors() {
    let state = test_state().await;
    let alice = seed_user(&state.db_pool, "Alice").await;
    let bob = seed_user(&state.db_pool, "Bob").await;

    let (_, chat) = send_json(
        &state,
        "POST",
        "/api/chat",
        Some(&bearer(&alice)),
        Some(json!({ "user_id": bob.public_id.clone() })),
    )
    .await;

    let (status, _) = send_json(
        &state,
        "POST",
        "/api/message",
        Some(&bearer(&alice)),
        Some(json!({ "chat_id": chat["id"], "content": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        &state,
        "POST",
        "/api/message",
        Some(&bearer(&alice)),
        Some(json!({ "chat_id": "no-such-chat", "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn group_lifecycle_over_the_api() {
    let state = test_state().await;
    let alice = seed_user(&state.db_pool, "Alice").await;
    let bob = seed_user(&state.db_pool, "Bob").await;
    let cara = seed_user(&state.db_pool, "Cara").await;
    let dave = seed_user(&state.db_pool, "Dave").await;

    let (status, group) = send_json(
        &state,
        "POST",
        "/api/chat/group",
        Some(&bearer(&alice)),
        Some(json!({
            "user_ids": [bob.public_id.clone(), cara.public_id.clone()],
            "name": "Weekend"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["is_group"], true);
    assert_eq!(group["group_name"], "Weekend");
    assert_eq!(group["group_admin"], alice.public_id);
    let chat_id = group["id"].as_str().unwrap();

    // Only the admin may rename or add.
    let (status, _) = send_json(
        &state,
        "PUT",
        "/api/chat/rename",
        Some(&bearer(&bob)),
        Some(json!({ "chat_id": chat_id, "name": "Hijacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, renamed) = send_json(
        &state,
        "PUT",
        "/api/chat/rename",
        Some(&bearer(&alice)),
        Some(json!({ "chat_id": chat_id, "name": "Weekend Plans" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["group_name"], "Weekend Plans");

    let (status, added) = send_json(
        &state,
        "PUT",
        "/api/chat/groupadd",
        Some(&bearer(&alice)),
        Some(json!({ "chat_id": chat_id, "user_id": dave.public_id.clone() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(added["members"].as_array().unwrap().len(), 4);

    // A member may leave on their own.
    let (status, after_leave) = send_json(
        &state,
        "PUT",
        "/api/chat/groupremove",
        Some(&bearer(&bob)),
        Some(json!({ "chat_id": chat_id, "user_id": bob.public_id.clone() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after_leave["members"].as_array().unwrap().len(), 3);

    let (status, _) = send_json(
        &state,
        "POST",
        "/api/chat/group",
        Some(&bearer(&alice)),
        Some(json!({ "user_ids": [bob.public_id.clone()], "name": "Too small" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn websocket_upgrade_requires_a_valid_token() {
    let state = test_state().await;

    let request = Request::builder()
        .method("GET")
        .uri("/ws")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
