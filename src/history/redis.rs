use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use lazy_static::lazy_static;
use log::warn;
use redis::{ AsyncCommands, Client, Script };
use serde::{ Deserialize, Serialize };
use std::collections::HashMap;

use super::ConversationStore;
use crate::error::{ StoreError, StoreResult };
use crate::models::chat::{ ChatMessage, ChatSession, MessageMetadata, NewMessage, Role };

lazy_static! {
    // KEYS: session hash, user index. ARGV: session id, user id, title, now ms.
    static ref CREATE_SESSION: Script = Script::new(r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1],
    'session_id', ARGV[1],
    'user_id', ARGV[2],
    'title', ARGV[3],
    'created_at', ARGV[4],
    'last_message_at', ARGV[4],
    'message_count', 0,
    'is_active', 1,
    'last_timestamp', 0)
redis.call('ZADD', KEYS[2], ARGV[4], ARGV[1])
return 1
"#);

    // KEYS: session hash, message list. ARGV: user id, now ms, message body json.
    // Returns the assigned timestamp, or -1 when the session is not the caller's.
    static ref APPEND_MESSAGE: Script = Script::new(r#"
if redis.call('HGET', KEYS[1], 'user_id') ~= ARGV[1] then
    return -1
end
local last = tonumber(redis.call('HGET', KEYS[1], 'last_timestamp') or '0')
local ts = tonumber(ARGV[2])
if last > ts then
    ts = last
end
redis.call('HSET', KEYS[1], 'last_timestamp', ts)
redis.call('RPUSH', KEYS[2], '{"timestampMs":' .. string.format('%d', ts) .. ',"body":' .. ARGV[3] .. '}')
return ts
"#);

    // KEYS: session hash, user index. ARGV: user id, now ms, session id.
    static ref TOUCH_SESSION: Script = Script::new(r#"
if redis.call('HGET', KEYS[1], 'user_id') ~= ARGV[1] then
    return 0
end
local last = tonumber(redis.call('HGET', KEYS[1], 'last_message_at') or '0')
local ts = tonumber(ARGV[2])
if last > ts then
    ts = last
end
redis.call('HINCRBY', KEYS[1], 'message_count', 2)
redis.call('HSET', KEYS[1], 'last_message_at', string.format('%d', ts))
redis.call('ZADD', KEYS[2], ts, ARGV[3])
return 1
"#);
}

#[derive(Serialize, Deserialize)]
struct StoredBody {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<MessageMetadata>,
}

#[derive(Deserialize)]
struct StoredEnvelope {
    #[serde(rename = "timestampMs")]
    timestamp_ms: i64,
    body: StoredBody,
}

fn millis_to_datetime(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("invalid stored timestamp: {}", ms)))
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> StoreResult<&'a str> {
    fields
        .get(name)
        .map(|s| s.as_str())
        .ok_or_else(|| StoreError::Backend(format!("session hash missing field '{}'", name)))
}

fn parse_i64(fields: &HashMap<String, String>, name: &str) -> StoreResult<i64> {
    field(fields, name)?
        .parse::<i64>()
        .map_err(|e| StoreError::Backend(format!("session field '{}': {}", name, e)))
}

fn session_from_hash(fields: &HashMap<String, String>) -> StoreResult<ChatSession> {
    Ok(ChatSession {
        session_id: field(fields, "session_id")?.to_string(),
        user_id: field(fields, "user_id")?.to_string(),
        title: field(fields, "title")?.to_string(),
        created_at: millis_to_datetime(parse_i64(fields, "created_at")?)?,
        last_message_at: millis_to_datetime(parse_i64(fields, "last_message_at")?)?,
        message_count: parse_i64(fields, "message_count")?.max(0) as u64,
        is_active: field(fields, "is_active")? == "1",
    })
}

pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}chat:session:{}", self.key_prefix, session_id)
    }

    fn messages_key(&self, session_id: &str) -> String {
        format!("{}chat:messages:{}", self.key_prefix, session_id)
    }

    fn user_index_key(&self, user_id: &str) -> String {
        format!("{}chat:user:{}:sessions", self.key_prefix, user_id)
    }

    async fn load_owned_session(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        session_id: &str,
        user_id: &str
    ) -> StoreResult<ChatSession> {
        let fields: HashMap<String, String> = conn.hgetall(self.session_key(session_id)).await?;
        if fields.is_empty() {
            return Err(StoreError::NotFound);
        }
        let session = session_from_hash(&fields)?;
        if session.user_id != user_id {
            return Err(StoreError::NotFound);
        }
        Ok(session)
    }

    fn decode_messages(
        &self,
        session_id: &str,
        user_id: &str,
        entries: Vec<String>
    ) -> StoreResult<Vec<ChatMessage>> {
        let mut messages = Vec::with_capacity(entries.len());
        for entry in &entries {
            let envelope: StoredEnvelope = serde_json::from_str(entry)?;
            messages.push(ChatMessage {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                role: envelope.body.role,
                content: envelope.body.content,
                metadata: envelope.body.metadata,
                timestamp: millis_to_datetime(envelope.timestamp_ms)?,
            });
        }
        Ok(messages)
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn create_session(
        &self,
        session_id: &str,
        user_id: &str,
        title: &str
    ) -> StoreResult<ChatSession> {
        let mut conn = self.get_connection().await?;
        let now = Utc::now();
        let created: i64 = CREATE_SESSION.key(self.session_key(session_id))
            .key(self.user_index_key(user_id))
            .arg(session_id)
            .arg(user_id)
            .arg(title)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn).await?;
        if created == 0 {
            return Err(StoreError::AlreadyExists(session_id.to_string()));
        }
        self.load_owned_session(&mut conn, session_id, user_id).await
    }

    async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: NewMessage
    ) -> StoreResult<ChatMessage> {
        let mut conn = self.get_connection().await?;
        let body = StoredBody {
            role: message.role,
            content: message.content,
            metadata: message.metadata,
        };
        let body_json = serde_json::to_string(&body)?;
        let ts: i64 = APPEND_MESSAGE.key(self.session_key(session_id))
            .key(self.messages_key(session_id))
            .arg(user_id)
            .arg(Utc::now().timestamp_millis())
            .arg(body_json)
            .invoke_async(&mut conn).await?;
        if ts < 0 {
            return Err(StoreError::NotFound);
        }
        Ok(ChatMessage {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            role: body.role,
            content: body.content,
            metadata: body.metadata,
            timestamp: millis_to_datetime(ts)?,
        })
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        user_id: &str,
        limit: usize
    ) -> StoreResult<Vec<ChatMessage>> {
        let mut conn = self.get_connection().await?;
        self.load_owned_session(&mut conn, session_id, user_id).await?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let start = -(limit as isize);
        let entries: Vec<String> = conn.lrange(self.messages_key(session_id), start, -1).await?;
        self.decode_messages(session_id, user_id, entries)
    }

    async fn session_history(
        &self,
        session_id: &str,
        user_id: &str
    ) -> StoreResult<Vec<ChatMessage>> {
        let mut conn = self.get_connection().await?;
        self.load_owned_session(&mut conn, session_id, user_id).await?;
        let entries: Vec<String> = conn.lrange(self.messages_key(session_id), 0, -1).await?;
        self.decode_messages(session_id, user_id, entries)
    }

    async fn update_session_on_append(
        &self,
        session_id: &str,
        user_id: &str
    ) -> StoreResult<ChatSession> {
        let mut conn = self.get_connection().await?;
        let touched: i64 = TOUCH_SESSION.key(self.session_key(session_id))
            .key(self.user_index_key(user_id))
            .arg(user_id)
            .arg(Utc::now().timestamp_millis())
            .arg(session_id)
            .invoke_async(&mut conn).await?;
        if touched == 0 {
            return Err(StoreError::NotFound);
        }
        self.load_owned_session(&mut conn, session_id, user_id).await
    }

    async fn get_session(&self, session_id: &str, user_id: &str) -> StoreResult<ChatSession> {
        let mut conn = self.get_connection().await?;
        self.load_owned_session(&mut conn, session_id, user_id).await
    }

    async fn list_sessions(
        &self,
        user_id: &str,
        active_only: bool,
        limit: usize
    ) -> StoreResult<Vec<ChatSession>> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.user_index_key(user_id), 0, -1).await?;
        let mut sessions = Vec::new();
        for id in ids {
            if sessions.len() >= limit {
                break;
            }
            match self.load_owned_session(&mut conn, &id, user_id).await {
                Ok(session) if !active_only || session.is_active => sessions.push(session),
                Ok(_) => {}
                Err(StoreError::NotFound) => {
                    warn!("Session index for user {} references missing session {}", user_id, id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sessions)
    }

    async fn deactivate_session(&self, session_id: &str, user_id: &str) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        self.load_owned_session(&mut conn, session_id, user_id).await?;
        let _: i64 = conn.hset(self.session_key(session_id), "is_active", 0).await?;
        Ok(())
    }
}
