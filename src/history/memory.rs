use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::ConversationStore;
use crate::error::{ StoreError, StoreResult };
use crate::models::chat::{ ChatMessage, ChatSession, NewMessage };

struct SessionEntry {
    session: ChatSession,
    messages: Vec<ChatMessage>,
}

#[derive(Default)]
pub struct MemoryConversationStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn owned<'a>(
    sessions: &'a HashMap<String, SessionEntry>,
    session_id: &str,
    user_id: &str
) -> StoreResult<&'a SessionEntry> {
    sessions
        .get(session_id)
        .filter(|entry| entry.session.user_id == user_id)
        .ok_or(StoreError::NotFound)
}

fn owned_mut<'a>(
    sessions: &'a mut HashMap<String, SessionEntry>,
    session_id: &str,
    user_id: &str
) -> StoreResult<&'a mut SessionEntry> {
    sessions
        .get_mut(session_id)
        .filter(|entry| entry.session.user_id == user_id)
        .ok_or(StoreError::NotFound)
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_session(
        &self,
        session_id: &str,
        user_id: &str,
        title: &str
    ) -> StoreResult<ChatSession> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(StoreError::AlreadyExists(session_id.to_string()));
        }
        let now = Utc::now();
        let session = ChatSession {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            last_message_at: now,
            message_count: 0,
            is_active: true,
        };
        sessions.insert(session_id.to_string(), SessionEntry {
            session: session.clone(),
            messages: Vec::new(),
        });
        Ok(session)
    }

    async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: NewMessage
    ) -> StoreResult<ChatMessage> {
        let mut sessions = self.sessions.write().await;
        let entry = owned_mut(&mut sessions, session_id, user_id)?;
        let now = Utc::now();
        let timestamp = match entry.messages.last() {
            Some(prev) if prev.timestamp > now => prev.timestamp,
            _ => now,
        };
        let stored = ChatMessage {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            role: message.role,
            content: message.content,
            metadata: message.metadata,
            timestamp,
        };
        entry.messages.push(stored.clone());
        Ok(stored)
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize
    ) -> StoreResult<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        let entry = owned(&sessions, session_id, user_id)?;
        let start = entry.messages.len().saturating_sub(limit);
        Ok(entry.messages[start..].to_vec())
    }

    async fn session_history(
        &self,
        session_id: &str,
        user_id: &str
    ) -> StoreResult<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        Ok(owned(&sessions, session_id, user_id)?.messages.clone())
    }

    async fn update_session_on_append(
        &self,
        session_id: &str,
        user_id: &str
    ) -> StoreResult<ChatSession> {
        let mut sessions = self.sessions.write().await;
        let entry = owned_mut(&mut sessions, session_id, user_id)?;
        let now = Utc::now();
        entry.session.message_count += 2;
        if now > entry.session.last_message_at {
            entry.session.last_message_at = now;
        }
        Ok(entry.session.clone())
    }

    async fn get_session(&self, session_id: &str, user_id: &str) -> StoreResult<ChatSession> {
        let sessions = self.sessions.read().await;
        Ok(owned(&sessions, session_id, user_id)?.session.clone())
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        active_only: bool,
        limit: usize
    ) -> StoreResult<Vec<ChatSession>> {
        let sessions = self.sessions.read().await;
        let mut result: Vec<ChatSession> = sessions
            .values()
            .map(|entry| &entry.session)
            .filter(|s| s.user_id == user_id && (!active_only || s.is_active))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn deactivate_session(&self, session_id: &str, user_id: &str) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        owned_mut(&mut sessions, session_id, user_id)?.session.is_active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ MessageMetadata, Role };

    fn user_turn(content: &str) -> NewMessage {
        NewMessage { role: Role::User, content: content.into(), metadata: None }
    }

    #[tokio::test]
    async fn append_and_read_back_in_order() {
        let store = MemoryConversationStore::new();
        store.create_session("s1", "alice", "New Chat").await.unwrap();
        for i in 0..5 {
            store.append_message("s1", "alice", user_turn(&format!("m{}", i))).await.unwrap();
        }

        let recent = store.recent_messages("s1", "alice", 3).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);

        let all = store.session_history("s1", "alice").await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn metadata_is_kept_with_the_turn() {
        let store = MemoryConversationStore::new();
        store.create_session("s1", "alice", "t").await.unwrap();
        let metadata = MessageMetadata {
            emotional_state: Some("anxious".into()),
            risk_level: Some(0),
            ..Default::default()
        };
        let saved = store.append_message("s1", "alice", NewMessage {
            role: Role::User,
            content: "x".into(),
            metadata: Some(metadata.clone()),
        }).await.unwrap();
        assert_eq!(saved.metadata, Some(metadata));
    }

    #[tokio::test]
    async fn foreign_sessions_look_missing() {
        let store = MemoryConversationStore::new();
        store.create_session("s1", "alice", "t").await.unwrap();
        store.append_message("s1", "alice", user_turn("secret")).await.unwrap();

        assert!(matches!(store.get_session("s1", "mallory").await, Err(StoreError::NotFound)));
        assert!(matches!(store.session_history("s1", "mallory").await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.append_message("s1", "mallory", user_turn("x")).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.update_session_on_append("s1", "mallory").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(store.deactivate_session("s1", "mallory").await, Err(StoreError::NotFound)));
        assert_eq!(store.session_history("s1", "alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_session_id_is_rejected() {
        let store = MemoryConversationStore::new();
        store.create_session("s1", "alice", "t").await.unwrap();
        assert!(matches!(
            store.create_session("s1", "bob", "t").await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn update_counts_exchange() {
        let store = MemoryConversationStore::new();
        let created = store.create_session("s1", "alice", "t").await.unwrap();
        let updated = store.update_session_on_append("s1", "alice").await.unwrap();
        assert_eq!(updated.message_count, 2);
        assert!(updated.last_message_at >= created.last_message_at);
    }

    #[tokio::test]
    async fn list_sessions_orders_and_filters() {
        let store = MemoryConversationStore::new();
        store.create_session("old", "alice", "Old").await.unwrap();
        store.create_session("hidden", "alice", "Hidden").await.unwrap();
        store.create_session("other", "bob", "Bob's").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create_session("new", "alice", "New").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.update_session_on_append("old", "alice").await.unwrap();
        store.deactivate_session("hidden", "alice").await.unwrap();

        let active = store.list_sessions("alice", true, 50).await.unwrap();
        let ids: Vec<_> = active.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["old", "new"]);

        let all = store.list_sessions("alice", false, 50).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(store.list_sessions("alice", false, 1).await.unwrap().len(), 1);
    }
}
