//! Wire protocol spoken over the realtime socket.
//!
//! Events are JSON objects tagged by `type`. Clients send [`ClientEvent`]s,
//! the server answers with [`ServerEvent`]s.

use serde::{Deserialize, Serialize};

/// Events a client may send after the socket is established.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Bind this connection to the authenticated user. Must come first.
    Setup,
    /// Subscribe to a chat the user is a member of.
    JoinChat { chat_id: String },
    /// Drop a prior subscription.
    LeaveChat { chat_id: String },
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Acknowledges a successful `setup`.
    Connected,
    /// A new message in one of the user's chats.
    MessageReceived { message: MessagePayload },
    /// Lightweight alert accompanying every delivered message, usable for
    /// unread badges without parsing the full payload.
    NotificationReceived {
        chat_id: String,
        sender_name: String,
    },
    /// A request could not be honored; the connection stays open.
    Error { message: String },
}

/// The message body pushed to recipients, mirroring the REST response shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub id: String,
    pub content: String,
    pub created_at: String,
    pub sender: SenderPayload,
    pub chat: ChatPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SenderPayload {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatPayload {
    pub id: String,
    pub is_group: bool,
    pub group_name: Option<String>,
}
