use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use redis::{ AsyncCommands, Client };

use super::WellnessStore;
use crate::error::StoreResult;
use crate::models::wellness::{ ActivityEntry, MoodEntry };

/// Entries live in per-user sorted sets scored by timestamp (ms).
pub struct RedisWellnessStore {
    client: Client,
    key_prefix: String,
}

impl RedisWellnessStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn moods_key(&self, user_id: &str) -> String {
        format!("{}mood:{}", self.key_prefix, user_id)
    }

    fn activities_key(&self, user_id: &str) -> String {
        format!("{}activity:{}", self.key_prefix, user_id)
    }
}

#[async_trait]
impl WellnessStore for RedisWellnessStore {
    async fn add_mood(&self, entry: MoodEntry) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(&entry)?;
        let _: i64 = conn
            .zadd(self.moods_key(&entry.user_id), json, entry.timestamp.timestamp_millis())
            .await?;
        Ok(())
    }

    async fn add_activity(&self, entry: ActivityEntry) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(&entry)?;
        let _: i64 = conn
            .zadd(self.activities_key(&entry.user_id), json, entry.timestamp.timestamp_millis())
            .await?;
        Ok(())
    }

    async fn activities_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>
    ) -> StoreResult<Vec<ActivityEntry>> {
        let mut conn = self.get_connection().await?;
        let entries: Vec<String> = conn
            .zrevrangebyscore(self.activities_key(user_id), "+inf", since.timestamp_millis())
            .await?;
        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            result.push(serde_json::from_str(&entry)?);
        }
        Ok(result)
    }
}
