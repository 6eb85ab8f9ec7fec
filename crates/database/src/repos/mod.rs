mod chat_repository;
mod message_repository;
mod user_repository;

pub use chat_repository::ChatRepository;
pub use message_repository::MessageRepository;
pub use user_repository::UserRepository;
