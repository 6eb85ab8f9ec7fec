//! HTTP and WebSocket surface of the Parley backend.

mod error;
mod state;
mod util;

pub mod routes;

pub use error::ApiError;
pub use state::AppState;

use axum::{
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health_check))
        // Chat routes
        .route("/api/chat", post(routes::chats::open_direct_chat))
        .route("/api/chat", get(routes::chats::list_chats))
        .route("/api/chat/group", post(routes::chats::create_group))
        .route("/api/chat/rename", put(routes::chats::rename_group))
        .route("/api/chat/groupadd", put(routes::chats::add_to_group))
        .route("/api/chat/groupremove", put(routes::chats::remove_from_group))
        // Message routes
        .route("/api/message", post(routes::messages::send_message))
        .route("/api/message/:chat_id", get(routes::messages::list_messages))
        // WebSocket route
        .route("/ws", get(routes::websocket::websocket_handler))
        .with_state(state)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}
