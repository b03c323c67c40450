use crate::cli::Args;
use crate::config::prompt::{ PromptConfig, RiskThresholds };
use crate::error::StoreError;
use crate::history::ConversationStore;
use crate::llm::{ GenerationParams, LlmConfig, LlmType };
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::llm::gateway::{ GenerationGateway, ReplySource };
use crate::models::chat::{ ChatMessage, ChatSession, MessageMetadata, NewMessage, Role };
use crate::therapy::{ classify, compose, Classification, TechniqueChoice };
use crate::therapy::technique::pick;

use chrono::Utc;
use log::{ debug, info, warn };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use uuid::Uuid;

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";
pub const MAX_LISTED_SESSIONS: usize = 50;

#[derive(Debug, ThisError)]
pub enum ChatError {
    #[error("Message is required")]
    EmptyMessage,
    #[error("Session not found")]
    SessionNotFound,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ChatError::SessionNotFound,
            other => ChatError::Store(other),
        }
    }
}

/// Knobs of the message pipeline that come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub thresholds: RiskThresholds,
    pub max_message_chars: usize,
    pub history_window: usize,
}

/// Result of one processed user message.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user_message: ChatMessage,
    pub ai_message: ChatMessage,
    pub classification: Classification,
    pub technique: TechniqueChoice,
    pub session: ChatSession,
    pub source: ReplySource,
}

#[derive(Clone)]
pub struct TherapyAgent {
    store: Arc<dyn ConversationStore>,
    gateway: GenerationGateway,
    prompt_config: Arc<PromptConfig>,
    settings: PipelineSettings,
}

fn new_session_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

impl TherapyAgent {
    pub fn initialize_llm_client(
        args: &Args
    ) -> Result<Arc<dyn ChatClient>, Box<dyn Error + Send + Sync>> {
        let chat_llm_type: LlmType = args.chat_llm_type.parse()?;
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type: chat_llm_type,
            base_url: args.chat_base_url.clone(),
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
            timeout: Duration::from_secs(args.llm_timeout_secs),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            chat_config.llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );
        Ok(chat_client)
    }

    pub fn new(
        store: Arc<dyn ConversationStore>,
        chat_client: Arc<dyn ChatClient>,
        prompt_config: Arc<PromptConfig>,
        args: &Args
    ) -> Self {
        let settings = PipelineSettings {
            thresholds: RiskThresholds {
                resource_mention: args.resource_risk_threshold,
                crisis_technique: args.crisis_risk_threshold,
            },
            max_message_chars: args.max_message_chars,
            history_window: args.history_window,
        };
        let params = GenerationParams {
            temperature: args.llm_temperature,
            top_p: args.llm_top_p,
            top_k: args.llm_top_k,
            max_output_tokens: args.llm_max_output_tokens,
        };
        let gateway = GenerationGateway::new(
            chat_client,
            params,
            Duration::from_secs(args.llm_timeout_secs),
            args.llm_max_attempts,
            prompt_config.clone(),
            settings.thresholds
        );
        Self { store, gateway, prompt_config, settings }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        title: Option<String>
    ) -> Result<ChatSession, ChatError> {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
        let session = self.store.create_session(&new_session_id(), user_id, &title).await?;
        info!("Created chat session {} for user {}", session.session_id, user_id);
        Ok(session)
    }

    /// Runs one user message through classification, context building,
    /// generation and persistence. Only invalid input or store failures make
    /// it fail; generation problems end in a fallback reply.
    pub async fn send_message(
        &self,
        user_id: &str,
        session_id: &str,
        raw_message: &str
    ) -> Result<Exchange, ChatError> {
        let trimmed = raw_message.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let content = truncate_chars(trimmed, self.settings.max_message_chars);

        let session = self.store.get_session(session_id, user_id).await?;
        if !session.is_active {
            return Err(ChatError::SessionNotFound);
        }

        let classification = classify(&content);
        info!(
            "Session {}: {} chars, state={}, risk={}, themes={:?}",
            session_id,
            content.chars().count(),
            classification.emotional_state,
            classification.risk_level,
            classification.themes
        );

        let user_message = self.store.append_message(session_id, user_id, NewMessage {
            role: Role::User,
            content: content.clone(),
            metadata: Some(MessageMetadata {
                emotional_state: Some(classification.emotional_state.clone()),
                risk_level: Some(classification.risk_level),
                themes: classification.themes.clone(),
                technique: None,
                goal: None,
            }),
        }).await?;

        let window = self.settings.history_window;
        let mut history = self.store.recent_messages(session_id, user_id, window + 1).await?;
        if let Some(pos) = history.iter().rposition(|m| *m == user_message) {
            history.remove(pos);
        }
        let start = history.len().saturating_sub(window);
        let history = &history[start..];

        let technique: TechniqueChoice = pick(
            &classification.themes,
            classification.risk_level,
            &self.settings.thresholds
        ).into();
        let prompt = compose(
            &self.prompt_config,
            &self.settings.thresholds,
            history,
            window,
            &content,
            &classification,
            &technique
        );
        debug!("Composed prompt of {} chars with {} prior turns", prompt.len(), history.len());

        let outcome = self.gateway.generate(&prompt, classification.risk_level).await;
        if let ReplySource::Fallback(reason) = &outcome.source {
            warn!("Session {}: using fallback reply ({})", session_id, reason);
        }

        let ai_message = self.store.append_message(session_id, user_id, NewMessage {
            role: Role::Assistant,
            content: outcome.text,
            metadata: Some(MessageMetadata {
                emotional_state: Some(classification.emotional_state.clone()),
                risk_level: Some(classification.risk_level),
                themes: classification.themes.clone(),
                technique: Some(technique.technique.clone()),
                goal: Some(technique.goal.clone()),
            }),
        }).await?;

        let session = self.store.update_session_on_append(session_id, user_id).await?;

        Ok(Exchange {
            user_message,
            ai_message,
            classification,
            technique,
            session,
            source: outcome.source,
        })
    }

    pub async fn history(
        &self,
        user_id: &str,
        session_id: &str
    ) -> Result<Vec<ChatMessage>, ChatError> {
        Ok(self.store.session_history(session_id, user_id).await?)
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, ChatError> {
        Ok(self.store.list_sessions(user_id, true, MAX_LISTED_SESSIONS).await?)
    }

    pub async fn deactivate_session(&self, user_id: &str, session_id: &str) -> Result<(), ChatError> {
        self.store.deactivate_session(session_id, user_id).await?;
        info!("Deactivated chat session {} for user {}", session_id, user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryConversationStore;
    use crate::llm::chat::CompletionResponse;
    use async_trait::async_trait;
    use std::error::Error as StdError;
    use std::sync::Mutex;

    /// Records every prompt; replies with a fixed text or fails.
    struct RecordingClient {
        reply: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatClient for RecordingClient {
        async fn complete(
            &self,
            prompt: &str,
            _params: &GenerationParams
        ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.reply {
                Some(text) => Ok(CompletionResponse { response: text.to_string() }),
                None => Err("quota exceeded".into()),
            }
        }

        fn get_model(&self) -> String {
            "recording".to_string()
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }
    }

    fn agent_with_cap(
        reply: Option<&'static str>,
        max_message_chars: usize
    ) -> (TherapyAgent, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient { reply, prompts: Mutex::new(Vec::new()) });
        let mut args = Args::in_memory();
        args.max_message_chars = max_message_chars;
        let agent = TherapyAgent::new(
            Arc::new(MemoryConversationStore::new()),
            client.clone(),
            Arc::new(PromptConfig::default()),
            &args
        );
        (agent, client)
    }

    fn agent(reply: Option<&'static str>) -> (TherapyAgent, Arc<RecordingClient>) {
        agent_with_cap(reply, 5000)
    }

    #[tokio::test]
    async fn anxious_message_uses_grounding() {
        let (agent, client) = agent(Some("Let's take a slow breath together."));
        let session = agent.create_session("alice", None).await.unwrap();
        assert_eq!(session.title, DEFAULT_SESSION_TITLE);
        assert!(session.session_id.starts_with("session_"));

        let exchange = agent
            .send_message("alice", &session.session_id, "I feel anxious about my exam").await
            .unwrap();

        let user_meta = exchange.user_message.metadata.clone().unwrap();
        assert_eq!(user_meta.emotional_state.as_deref(), Some("anxious"));
        assert_eq!(user_meta.risk_level, Some(0));
        assert!(user_meta.themes.contains("anxiety"));

        assert_eq!(exchange.technique.technique, "Grounding & Mindfulness");
        let ai_meta = exchange.ai_message.metadata.clone().unwrap();
        assert_eq!(ai_meta.technique.as_deref(), Some("Grounding & Mindfulness"));
        assert_eq!(exchange.ai_message.content, "Let's take a slow breath together.");
        assert_eq!(exchange.source, ReplySource::Model);

        assert_eq!(exchange.session.message_count, session.message_count + 2);
        assert!(exchange.session.last_message_at >= session.last_message_at);

        let prompts = client.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(!prompts[0].contains("Previous conversation:"));
    }

    #[tokio::test]
    async fn crisis_message_falls_back_to_hotline() {
        let (agent, _) = agent(None);
        let session = agent.create_session("bob", Some("Night".into())).await.unwrap();
        let exchange = agent
            .send_message("bob", &session.session_id, "I want to kill myself").await
            .unwrap();

        assert_eq!(exchange.classification.risk_level, 10);
        assert!(exchange.classification.themes.contains("crisis"));
        assert_eq!(exchange.technique.technique, "Crisis Support");
        assert!(exchange.ai_message.content.contains("988"));
        assert!(matches!(exchange.source, ReplySource::Fallback(_)));
    }

    #[tokio::test]
    async fn empty_message_has_no_side_effects() {
        let (agent, client) = agent(Some("hi"));
        let session = agent.create_session("alice", None).await.unwrap();
        assert!(matches!(
            agent.send_message("alice", &session.session_id, "   ").await,
            Err(ChatError::EmptyMessage)
        ));
        assert!(agent.history("alice", &session.session_id).await.unwrap().is_empty());
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_message_is_truncated_and_history_excludes_current() {
        let (agent, client) = agent_with_cap(Some("ok"), 20);
        let session = agent.create_session("alice", None).await.unwrap();
        agent.send_message("alice", &session.session_id, "first message").await.unwrap();
        let long = "ü".repeat(50);
        let exchange = agent.send_message("alice", &session.session_id, &long).await.unwrap();
        assert_eq!(exchange.user_message.content.chars().count(), 20);

        assert_eq!(agent.history("alice", &session.session_id).await.unwrap().len(), 4);

        let prompts = client.prompts.lock().unwrap();
        let second = &prompts[1];
        assert!(second.contains("User: first message\nAssistant: ok\n"));
        assert!(!second.contains(&format!("User: {}", exchange.user_message.content)));
    }

    #[tokio::test]
    async fn foreign_and_inactive_sessions_are_not_found() {
        let (agent, _) = agent(Some("ok"));
        let session = agent.create_session("alice", None).await.unwrap();
        assert!(matches!(
            agent.send_message("mallory", &session.session_id, "hello").await,
            Err(ChatError::SessionNotFound)
        ));
        assert!(matches!(
            agent.history("mallory", &session.session_id).await,
            Err(ChatError::SessionNotFound)
        ));

        agent.deactivate_session("alice", &session.session_id).await.unwrap();
        assert!(matches!(
            agent.send_message("alice", &session.session_id, "hello").await,
            Err(ChatError::SessionNotFound)
        ));
        assert!(agent.list_sessions("alice").await.unwrap().is_empty());
    }
}
