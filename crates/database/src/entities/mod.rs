mod chat;
mod message;
mod user;

pub use chat::Chat;
pub use message::{Message, MessageWithSender};
pub use user::{User, UserSummary};
