mod memory;
mod redis;
use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use crate::cli::Args;
use crate::error::StoreResult;
use crate::models::chat::{ ChatMessage, ChatSession, NewMessage };

pub use self::memory::MemoryConversationStore;
pub use self::redis::RedisConversationStore;

/// Persistence for chat sessions and their turns.
///
/// Every operation is scoped by `user_id`. A session owned by someone else is
/// reported as `StoreError::NotFound`, exactly like a missing one.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_session(
        &self,
        session_id: &str,
        user_id: &str,
        title: &str
    ) -> StoreResult<ChatSession>;

    /// Appends one turn atomically and assigns its timestamp, which is never
    /// earlier than the previous turn of the same session.
    async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: NewMessage
    ) -> StoreResult<ChatMessage>;

    /// The last `limit` turns, chronological.
    async fn recent_messages(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize
    ) -> StoreResult<Vec<ChatMessage>>;

    /// Every turn of the session, chronological.
    async fn session_history(
        &self,
        session_id: &str,
        user_id: &str
    ) -> StoreResult<Vec<ChatMessage>>;

    /// Counts one user/assistant exchange: `message_count += 2` and
    /// `last_message_at` moves to now.
    async fn update_session_on_append(
        &self,
        session_id: &str,
        user_id: &str
    ) -> StoreResult<ChatSession>;

    async fn get_session(&self, session_id: &str, user_id: &str) -> StoreResult<ChatSession>;

    /// Most recently active first.
    async fn list_sessions(
        &self,
        user_id: &str,
        active_only: bool,
        limit: usize
    ) -> StoreResult<Vec<ChatSession>>;

    async fn deactivate_session(&self, session_id: &str, user_id: &str) -> StoreResult<()>;
}

pub fn create_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.store_type.to_lowercase().as_str() {
        "redis" => {
            let store = RedisConversationStore::new(&args.store_host, &args.store_prefix)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryConversationStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported store type: {}", args.store_type)
                    )
                )
            ),
    }
}

pub fn initialize_conversation_store(
    args: &Args
) -> Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    info!("Chat sessions will be stored in: {} at {}", args.store_type, args.store_host);
    create_conversation_store(args)
}
