//! Realtime session tracking and message relay.
//!
//! This crate is transport- and storage-agnostic: the API layer owns the
//! WebSocket handshake and hands each accepted connection a sender half,
//! while the registry tracks which user is behind which connection and the
//! relay fans stored messages out to the online members of a chat.

pub mod events;
pub mod registry;
pub mod relay;

pub use events::{ChatPayload, ClientEvent, MessagePayload, SenderPayload, ServerEvent};
pub use registry::{ConnectionId, RealtimeError, SessionRegistry};
pub use relay::{DeliveryReport, RelayRouter};
